//! Client-side batch queue: the item store and the single driver task.

pub mod driver;
pub mod store;

use serde::{Deserialize, Serialize};

pub use driver::{is_credential_failure, CredentialAlert, DriverState, QueueDriver};
pub use store::{ItemStore, StoreStats};

/// When the driver becomes armed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StartPolicy {
    /// Only an explicit `start()` arms the driver.
    #[default]
    Explicit,
    /// Every intake that accepts at least one file arms the driver.
    AutoArmOnIntake,
}

/// What the driver does once nothing is queued or processing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DrainPolicy {
    /// Disarm, so the next batch needs another start.
    #[default]
    StopWhenDrained,
    /// Stay armed and pick up whatever is appended next.
    StayArmed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_serialization() {
        assert_eq!(
            serde_json::to_value(StartPolicy::AutoArmOnIntake).unwrap(),
            "autoArmOnIntake"
        );
        assert_eq!(
            serde_json::from_value::<DrainPolicy>(serde_json::json!("stayArmed")).unwrap(),
            DrainPolicy::StayArmed
        );
        assert_eq!(StartPolicy::default(), StartPolicy::Explicit);
        assert_eq!(DrainPolicy::default(), DrainPolicy::StopWhenDrained);
    }
}
