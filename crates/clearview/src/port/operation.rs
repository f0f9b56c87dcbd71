//! Long-running operation polling.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ProcessError;

/// A long-running operation as returned by `predictLongRunning` and
/// `operations.get`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl Operation {
    /// URI of the first generated video, if the operation produced one.
    pub fn video_uri(&self) -> Option<&str> {
        let response = self.response.as_ref()?;
        let samples = response
            .pointer("/generateVideoResponse/generatedSamples")
            .or_else(|| response.get("generatedVideos"))?;

        samples
            .get(0)?
            .pointer("/video/uri")?
            .as_str()
            .filter(|uri| !uri.is_empty())
    }

    /// Outcome of a finished operation: the video URI, or the reason there
    /// is none.
    pub fn into_video_uri(self) -> Result<String, ProcessError> {
        if let Some(error) = self.error {
            let message = if error.message.is_empty() {
                format!("Operation failed with code {}", error.code.unwrap_or_default())
            } else {
                error.message
            };
            return Err(ProcessError::Operation(message));
        }

        self.video_uri()
            .map(str::to_string)
            .ok_or_else(|| ProcessError::missing_artifact("No video URI returned"))
    }
}

/// Re-fetches `operation` every `interval` until it is done.
///
/// The first check happens after one interval. There is no deadline; a fetch
/// error ends polling.
pub async fn poll_until_done<F, Fut>(
    mut operation: Operation,
    interval: Duration,
    mut fetch: F,
) -> Result<Operation, ProcessError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Operation, ProcessError>>,
{
    let mut polls = 0u32;
    while !operation.done {
        tokio::time::sleep(interval).await;
        polls += 1;

        let name = operation.name.clone();
        let next = fetch(name.clone()).await?;
        operation = if next.name.is_empty() {
            Operation { name, ..next }
        } else {
            next
        };
        debug!(polls, done = operation.done, "Polled operation");
    }
    Ok(operation)
}
