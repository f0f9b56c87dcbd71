//! Item event broadcaster for real-time queue status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::item::{BatchItem, ItemId, JobConfig, ProcessingStatus};

/// Kind of change an event describes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemEventKind {
    /// An item was appended, moved through its lifecycle or settled.
    Status,
    /// An item was deleted by the operator.
    Removed,
    /// The whole store was emptied.
    Cleared,
    /// The driver was armed or stopped.
    Driver,
    /// The credential alert was raised or acknowledged.
    Credential,
}

/// Change notification for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEvent {
    pub kind: ItemEventKind,
    /// Item the event refers to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProcessingStatus>,
    /// Human-readable description.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_config: Option<JobConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_media_type: Option<String>,
    /// Driver armed state or credential alert state, for those kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<bool>,
}

impl ItemEvent {
    fn bare(kind: ItemEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            item_id: None,
            filename: None,
            status: None,
            message: message.into(),
            timestamp: Utc::now(),
            error: None,
            job_config: None,
            artifact_media_type: None,
            flag: None,
        }
    }

    /// Snapshot of an item's current status.
    pub fn status(item: &BatchItem) -> Self {
        let message = match item.status {
            ProcessingStatus::Queued => "Queued for processing".to_string(),
            ProcessingStatus::Processing => "Sent to remote service".to_string(),
            ProcessingStatus::Completed => "Processing completed successfully".to_string(),
            ProcessingStatus::Error => "Processing failed".to_string(),
        };
        Self {
            item_id: Some(item.id.clone()),
            filename: Some(item.filename().to_string()),
            status: Some(item.status),
            error: item.error.clone(),
            job_config: item.job_config,
            artifact_media_type: item.result.as_ref().map(|a| a.media_type.clone()),
            ..Self::bare(ItemEventKind::Status, message)
        }
    }

    pub fn removed(item: &BatchItem) -> Self {
        Self {
            item_id: Some(item.id.clone()),
            filename: Some(item.filename().to_string()),
            status: Some(item.status),
            ..Self::bare(ItemEventKind::Removed, "Item removed")
        }
    }

    pub fn cleared(count: usize) -> Self {
        Self::bare(ItemEventKind::Cleared, format!("Cleared {} item(s)", count))
    }

    pub fn driver(armed: bool) -> Self {
        let message = if armed { "Queue started" } else { "Queue stopped" };
        Self {
            flag: Some(armed),
            ..Self::bare(ItemEventKind::Driver, message)
        }
    }

    pub fn credential(raised: bool, reason: Option<&str>) -> Self {
        let message = if raised {
            "API key needs to be reconfigured"
        } else {
            "API key alert cleared"
        };
        Self {
            flag: Some(raised),
            error: reason.map(|r| r.to_string()),
            ..Self::bare(ItemEventKind::Credential, message)
        }
    }
}

/// Broadcasts item events for streaming.
#[derive(Clone)]
pub struct ItemEventBroadcaster {
    sender: Arc<broadcast::Sender<ItemEvent>>,
}

impl ItemEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: ItemEvent) {
        // no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemEvent> {
        self.sender.subscribe()
    }
}

impl Default for ItemEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

impl std::fmt::Debug for ItemEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemEventBroadcaster")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Artifact, SourcePayload};

    fn item() -> BatchItem {
        BatchItem::queued(SourcePayload::new("a.png", "image/png", vec![1]))
    }

    #[test]
    fn test_send_without_receivers() {
        let broadcaster = ItemEventBroadcaster::new(4);
        broadcaster.send(ItemEvent::cleared(0));
    }

    #[test]
    fn test_send_receive_status() {
        let broadcaster = ItemEventBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let item = item();
        broadcaster.send(ItemEvent::status(&item));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.kind, ItemEventKind::Status);
        assert_eq!(received.item_id, Some(item.id.clone()));
        assert_eq!(received.filename.as_deref(), Some("a.png"));
        assert_eq!(received.status, Some(ProcessingStatus::Queued));
        assert_eq!(received.message, "Queued for processing");
    }

    #[test]
    fn test_completed_event_carries_artifact_type() {
        let mut item = item();
        item.status = ProcessingStatus::Completed;
        item.result = Some(Artifact::new("image/png", vec![9]));

        let event = ItemEvent::status(&item);
        assert_eq!(event.artifact_media_type.as_deref(), Some("image/png"));
        assert!(event.error.is_none());
    }

    #[test]
    fn test_failed_event_carries_error() {
        let mut item = item();
        item.status = ProcessingStatus::Error;
        item.error = Some("boom".to_string());

        let event = ItemEvent::status(&item);
        assert_eq!(event.message, "Processing failed");
        assert_eq!(event.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(ItemEvent::driver(true)).unwrap();
        assert_eq!(json["kind"], "driver");
        assert_eq!(json["flag"], true);
        assert!(json.get("itemId").is_none());

        let json = serde_json::to_value(ItemEvent::credential(true, Some("nope"))).unwrap();
        assert_eq!(json["kind"], "credential");
        assert_eq!(json["error"], "nope");
    }
}
