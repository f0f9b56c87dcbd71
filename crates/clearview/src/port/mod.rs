//! Remote processing port and its Gemini adapters.

pub mod credential;
pub mod gemini;
pub mod operation;
pub mod photo;
pub mod video;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProcessError;
use crate::item::{Artifact, AspectRatio, ItemId, JobConfig, SourcePayload, VideoResolution};

pub use credential::{ConfiguredCredential, CredentialProvider, StaticCredential};
pub use gemini::GeminiClient;
pub use photo::WatermarkRemover;
pub use video::VideoReconstructor;

/// Video generation parameters. The workspace holds the live values; each
/// dispatch takes a copy so later edits only affect items not yet sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoJobParams {
    pub prompt: String,
    pub resolution: VideoResolution,
    pub aspect_ratio: AspectRatio,
}

impl VideoJobParams {
    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            resolution: self.resolution,
            aspect_ratio: self.aspect_ratio,
        }
    }
}

impl Default for VideoJobParams {
    fn default() -> Self {
        Self {
            prompt: crate::config::schema::default_video_prompt(),
            resolution: VideoResolution::default(),
            aspect_ratio: AspectRatio::default(),
        }
    }
}

/// One unit of work handed to a processor.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub item_id: ItemId,
    pub filename: String,
    pub payload: Arc<SourcePayload>,
    /// Present in video mode only.
    pub video: Option<VideoJobParams>,
}

/// Capability that turns a source payload into an artifact, eventually.
///
/// Implementations may take minutes and may fail. The error's `Display`
/// output becomes the item's error text.
#[async_trait]
pub trait RemoteProcessor: Send + Sync {
    async fn process(&self, job: DispatchJob) -> Result<Artifact, ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_config_snapshot() {
        let params = VideoJobParams {
            prompt: "drift".to_string(),
            resolution: VideoResolution::FullHd1080,
            aspect_ratio: AspectRatio::Portrait,
        };
        let frozen = params.job_config();
        assert_eq!(frozen.resolution, VideoResolution::FullHd1080);
        assert_eq!(frozen.aspect_ratio, AspectRatio::Portrait);
    }

    #[test]
    fn test_default_params() {
        let params = VideoJobParams::default();
        assert_eq!(params.prompt, "Smooth cinematic motion, natural lighting");
        assert_eq!(params.resolution, VideoResolution::Hd720);
        assert_eq!(params.aspect_ratio, AspectRatio::Landscape);
    }
}
