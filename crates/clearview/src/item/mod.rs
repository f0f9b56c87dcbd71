//! Batch items and their lifecycle status.

pub mod payload;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use payload::{Artifact, IntakeFile, SourcePayload};

/// Opaque item identifier, unique for the lifetime of a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status of a batch item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl ProcessingStatus {
    /// Completed and errored items never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Error)
    }

    /// Legal single-step transitions.
    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        matches!(
            (self, next),
            (ProcessingStatus::Queued, ProcessingStatus::Processing)
                | (ProcessingStatus::Processing, ProcessingStatus::Completed)
                | (ProcessingStatus::Processing, ProcessingStatus::Error)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Queued => write!(f, "Queued"),
            ProcessingStatus::Processing => write!(f, "Processing"),
            ProcessingStatus::Completed => write!(f, "Completed"),
            ProcessingStatus::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum VideoResolution {
    #[default]
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    FullHd1080,
}

impl VideoResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoResolution::Hd720 => "720p",
            VideoResolution::FullHd1080 => "1080p",
        }
    }
}

impl fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "720p" => Ok(VideoResolution::Hd720),
            "1080p" => Ok(VideoResolution::FullHd1080),
            other => Err(format!(
                "unknown resolution '{}' (expected 720p or 1080p)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            other => Err(format!(
                "unknown aspect ratio '{}' (expected 16:9 or 9:16)",
                other
            )),
        }
    }
}

/// Video parameters frozen at dispatch and kept on the completed item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub resolution: VideoResolution,
    pub aspect_ratio: AspectRatio,
}

/// One submitted unit of work.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: ItemId,
    pub status: ProcessingStatus,
    /// Original input, shared with in-flight dispatches.
    pub source: Arc<SourcePayload>,
    /// `data:` URL of the original content, derived once at intake.
    pub preview: String,
    /// Set only when completed.
    pub result: Option<Artifact>,
    /// Set only when errored.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Video mode only.
    pub job_config: Option<JobConfig>,
}

impl BatchItem {
    /// Creates a queued item for an accepted payload.
    pub fn queued(source: SourcePayload) -> Self {
        let preview = source.preview_url();
        Self {
            id: ItemId::new(),
            status: ProcessingStatus::Queued,
            source: Arc::new(source),
            preview,
            result: None,
            error: None,
            created_at: Utc::now(),
            job_config: None,
        }
    }

    pub fn filename(&self) -> &str {
        &self.source.name
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ids_are_unique() {
        let a = ItemId::new();
        let b = ItemId::new();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_transitions() {
        use ProcessingStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Error));

        assert!(!Queued.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Error.can_transition_to(Queued));
        assert!(!Error.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(ProcessingStatus::Error.is_terminal());
        assert!(!ProcessingStatus::Queued.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
    }

    #[test]
    fn test_video_option_parsing() {
        assert_eq!(
            "1080p".parse::<VideoResolution>().unwrap(),
            VideoResolution::FullHd1080
        );
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert!("4k".parse::<VideoResolution>().is_err());
        assert!("4:3".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_job_config_serialization() {
        let config = JobConfig {
            resolution: VideoResolution::FullHd1080,
            aspect_ratio: AspectRatio::Portrait,
        };
        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["resolution"], "1080p");
        assert_eq!(json["aspectRatio"], "9:16");
    }

    #[test]
    fn test_queued_item() {
        let payload = SourcePayload::new("a.png", "image/png", vec![1, 2, 3]);
        let item = BatchItem::queued(payload);
        assert_eq!(item.status, ProcessingStatus::Queued);
        assert_eq!(item.filename(), "a.png");
        assert_eq!(item.preview, "data:image/png;base64,AQID");
        assert!(item.result.is_none());
        assert!(item.error.is_none());
        assert!(item.job_config.is_none());
        assert!(!item.is_finished());
    }
}
