//! Thin HTTP client for the Gemini REST API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::ProcessError;

use super::credential::CredentialProvider;
use super::operation::Operation;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Maximum length of an error body carried into an item's error text.
const MAX_ERROR_BODY_LENGTH: usize = 300;

/// Body of a `generateContent` request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// First non-empty inline-data part of the first candidate.
    pub fn first_inline_data(&self) -> Option<&InlineData> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|part| part.inline_data.as_ref())
            .find(|inline| !inline.data.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Extracts the service's error message from a failed response body.
pub(crate) fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => truncate(body.trim()),
    }
}

fn truncate(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

/// Gemini REST client shared by the photo and video adapters.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    credential: Arc<dyn CredentialProvider>,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        credential: Arc<dyn CredentialProvider>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ProcessError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProcessError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    pub fn from_config(
        api: &ApiConfig,
        credential: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ProcessError> {
        Self::new(
            api.base_url.clone(),
            credential,
            Duration::from_secs(api.connect_timeout_secs),
            Duration::from_secs(api.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves the API key for one job.
    pub async fn api_key(&self) -> Result<SecretString, ProcessError> {
        Ok(self.credential.ensure_credential().await?)
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    fn operation_url(&self, name: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, name.trim_start_matches('/'))
    }

    pub async fn generate_content(
        &self,
        key: &SecretString,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProcessError> {
        let url = self.model_url(model, "generateContent");
        debug!(model, "POST generateContent");

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(ProcessError::transport)?;

        read_json(response).await
    }

    /// Submits a long-running prediction and returns the pending operation.
    pub async fn predict_long_running(
        &self,
        key: &SecretString,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<Operation, ProcessError> {
        let url = self.model_url(model, "predictLongRunning");
        debug!(model, "POST predictLongRunning");

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(ProcessError::transport)?;

        read_json(response).await
    }

    pub async fn get_operation(
        &self,
        key: &SecretString,
        name: &str,
    ) -> Result<Operation, ProcessError> {
        let response = self
            .http
            .get(self.operation_url(name))
            .header(API_KEY_HEADER, key.expose_secret())
            .send()
            .await
            .map_err(ProcessError::transport)?;

        read_json(response).await
    }

    /// Downloads a generated file. Any non-success status is a
    /// [`ProcessError::Download`].
    pub async fn download(&self, key: &SecretString, uri: &str) -> Result<Vec<u8>, ProcessError> {
        let response = self
            .http
            .get(uri)
            .header(API_KEY_HEADER, key.expose_secret())
            .send()
            .await
            .map_err(ProcessError::transport)?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Download rejected");
            return Err(ProcessError::Download);
        }

        let bytes = response.bytes().await.map_err(ProcessError::transport)?;
        Ok(bytes.to_vec())
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ProcessError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProcessError::Api {
            status: status.as_u16(),
            message: api_error_message(&body),
        });
    }

    response
        .json()
        .await
        .map_err(|e| ProcessError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::credential::StaticCredential;

    fn client(base: &str) -> GeminiClient {
        GeminiClient::new(
            base,
            Arc::new(StaticCredential::new("k")),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client("https://example.test/");
        assert_eq!(client.base_url(), "https://example.test");
        assert_eq!(
            client.model_url("gemini-2.5-flash-image", "generateContent"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            client.operation_url("models/veo/operations/abc"),
            "https://example.test/v1beta/models/veo/operations/abc"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::text("clean it"), Part::inline("image/png", "QUJD")],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "clean it");
        assert!(parts[0].get("inlineData").is_none());
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "QUJD");
    }

    #[test]
    fn test_first_inline_data_skips_text_parts() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here you go"},
                        {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
                    ]
                }
            }]
        }))
        .unwrap();

        let inline = response.first_inline_data().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "AAAA");
    }

    #[test]
    fn test_first_inline_data_absent() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "I can't do that"}]}}]
        }))
        .unwrap();
        assert!(response.first_inline_data().is_none());

        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.first_inline_data().is_none());
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#;
        assert_eq!(api_error_message(body), "Requested entity was not found.");
        assert_eq!(api_error_message("Bad gateway"), "Bad gateway");

        let long = "x".repeat(1000);
        assert!(api_error_message(&long).ends_with("... (truncated)"));
    }

    #[tokio::test]
    async fn test_api_key_from_provider() {
        let key = client("https://example.test").api_key().await.unwrap();
        assert_eq!(key.expose_secret(), "k");
    }
}
