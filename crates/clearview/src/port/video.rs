//! Image-to-video reconstruction via Veo long-running predictions.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, info_span, Instrument};

use crate::config::VideoConfig;
use crate::error::ProcessError;
use crate::item::{Artifact, SourcePayload};

use super::gemini::GeminiClient;
use super::operation::poll_until_done;
use super::{DispatchJob, RemoteProcessor, VideoJobParams};

const VIDEO_MEDIA_TYPE: &str = "video/mp4";

/// Wraps the operator's prompt in the fixed reconstruction framing.
pub fn build_prompt(prompt: &str) -> String {
    format!(
        "Cinematic video based on this image. {}. High quality, clean, no watermarks, no text overlays.",
        prompt.trim().trim_end_matches('.')
    )
}

/// Body of the `predictLongRunning` request for one reference image.
pub fn build_request(payload: &SourcePayload, params: &VideoJobParams) -> Value {
    json!({
        "instances": [{
            "prompt": build_prompt(&params.prompt),
            "referenceImages": [{
                "image": {
                    "bytesBase64Encoded": payload.to_base64(),
                    "mimeType": payload.media_type,
                },
                "referenceType": "asset",
            }],
        }],
        "parameters": {
            "aspectRatio": params.aspect_ratio.as_str(),
            "resolution": params.resolution.as_str(),
        },
    })
}

/// Generates a short video from a reference frame, polling the operation
/// until it finishes and downloading the result.
#[derive(Debug, Clone)]
pub struct VideoReconstructor {
    client: GeminiClient,
    model: String,
    poll_interval: Duration,
}

impl VideoReconstructor {
    pub fn new(client: GeminiClient, model: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            poll_interval,
        }
    }

    pub fn from_config(client: GeminiClient, config: &VideoConfig) -> Self {
        Self::new(
            client,
            config.model.clone(),
            Duration::from_secs(config.poll_interval_secs),
        )
    }
}

#[async_trait]
impl RemoteProcessor for VideoReconstructor {
    async fn process(&self, job: DispatchJob) -> Result<Artifact, ProcessError> {
        let params = job
            .video
            .as_ref()
            .ok_or_else(|| ProcessError::InvalidJob("video parameters missing".to_string()))?;

        let span = info_span!(
            "reconstruct_video",
            model = %self.model,
            resolution = %params.resolution,
            aspect_ratio = %params.aspect_ratio
        );

        async {
            let key = self.client.api_key().await?;

            let request = build_request(&job.payload, params);
            let operation = self
                .client
                .predict_long_running(&key, &self.model, &request)
                .await?;
            info!(operation = %operation.name, "Video generation submitted");

            let client = &self.client;
            let key_ref = &key;
            let finished = poll_until_done(operation, self.poll_interval, |name| async move {
                client.get_operation(key_ref, &name).await
            })
            .await?;

            let uri = finished.into_video_uri()?;
            debug!("Downloading generated video");
            let bytes = client.download(&key, &uri).await?;
            info!(bytes = bytes.len(), "Video downloaded");

            Ok::<_, ProcessError>(Artifact::new(VIDEO_MEDIA_TYPE, bytes))
        }
        .instrument(span)
        .await
    }
}
