//! Watermark removal via Gemini image generation.

use async_trait::async_trait;
use tracing::{debug, info_span, Instrument};

use crate::config::PhotoConfig;
use crate::error::ProcessError;
use crate::item::{Artifact, SourcePayload};

use super::gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerateContentResponse, Part,
};
use super::{DispatchJob, RemoteProcessor};

const FALLBACK_IMAGE_TYPE: &str = "image/png";

/// Sends each photo to an image model with a cleanup instruction and returns
/// the first generated image.
#[derive(Debug, Clone)]
pub struct WatermarkRemover {
    client: GeminiClient,
    model: String,
    instruction: String,
}

impl WatermarkRemover {
    pub fn new(
        client: GeminiClient,
        model: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            instruction: instruction.into(),
        }
    }

    pub fn from_config(client: GeminiClient, config: &PhotoConfig) -> Self {
        Self::new(client, config.model.clone(), config.instruction.clone())
    }

    pub fn build_request(&self, payload: &SourcePayload) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::text(self.instruction.clone()),
                    Part::inline(payload.media_type.clone(), payload.to_base64()),
                ],
            }],
        }
    }
}

/// Pulls the cleaned image out of a `generateContent` response.
pub fn extract_image(response: &GenerateContentResponse) -> Result<Artifact, ProcessError> {
    let inline = response
        .first_inline_data()
        .ok_or_else(|| ProcessError::missing_artifact("No image generated in response"))?;

    let media_type = if inline.mime_type.is_empty() {
        FALLBACK_IMAGE_TYPE
    } else {
        inline.mime_type.as_str()
    };

    Artifact::from_base64(media_type, &inline.data)
        .map_err(|e| ProcessError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteProcessor for WatermarkRemover {
    async fn process(&self, job: DispatchJob) -> Result<Artifact, ProcessError> {
        let span = info_span!("remove_watermark", model = %self.model);

        async {
            let key = self.client.api_key().await?;
            let request = self.build_request(&job.payload);
            let response = self
                .client
                .generate_content(&key, &self.model, &request)
                .await?;

            let artifact = extract_image(&response)?;
            debug!(bytes = artifact.len(), "Received cleaned image");
            Ok::<_, ProcessError>(artifact)
        }
        .instrument(span)
        .await
    }
}
