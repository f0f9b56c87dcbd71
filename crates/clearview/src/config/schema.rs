use serde::{Deserialize, Serialize};

use crate::item::{AspectRatio, VideoResolution};
use crate::queue::{DrainPolicy, StartPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub photo: PhotoConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            api: ApiConfig::default(),
            photo: PhotoConfig::default(),
            video: VideoConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

/// Remote service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Direct API key. Prefer `apiKeyFile` or `apiKeyEnvVar`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_key_env_var() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoConfig {
    #[serde(default = "default_photo_model")]
    pub model: String,
    #[serde(default = "default_instruction")]
    pub instruction: String,
    #[serde(default = "default_accepted_media_types")]
    pub accepted_media_types: Vec<String>,
}

fn default_photo_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_instruction() -> String {
    "Remove any watermarks, logos, text, or date stamps overlaying this image. \
     Reconstruct the background behind the removed elements seamlessly to look like \
     the original scene. High quality, photorealistic result."
        .to_string()
}

fn default_accepted_media_types() -> Vec<String> {
    vec![
        "image/png".to_string(),
        "image/jpeg".to_string(),
        "image/webp".to_string(),
    ]
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            model: default_photo_model(),
            instruction: default_instruction(),
            accepted_media_types: default_accepted_media_types(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    #[serde(default = "default_video_model")]
    pub model: String,
    /// Initial prompt; the operator may change it at runtime.
    #[serde(default = "default_video_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub resolution: VideoResolution,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_accepted_media_types")]
    pub accepted_media_types: Vec<String>,
}

fn default_video_model() -> String {
    "veo-3.1-generate-preview".to_string()
}

pub(crate) fn default_video_prompt() -> String {
    "Smooth cinematic motion, natural lighting".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            model: default_video_model(),
            prompt: default_video_prompt(),
            resolution: VideoResolution::default(),
            aspect_ratio: AspectRatio::default(),
            poll_interval_secs: default_poll_interval(),
            accepted_media_types: default_accepted_media_types(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "QueuePolicy::photo")]
    pub photo: QueuePolicy,
    #[serde(default = "QueuePolicy::video")]
    pub video: QueuePolicy,
}

fn default_event_capacity() -> usize {
    100
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            photo: QueuePolicy::photo(),
            video: QueuePolicy::video(),
        }
    }
}

/// Start and drain behaviour of one workspace mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePolicy {
    #[serde(default)]
    pub start: StartPolicy,
    #[serde(default)]
    pub drain: DrainPolicy,
}

impl QueuePolicy {
    /// Explicit start, stop once drained.
    pub fn photo() -> Self {
        Self {
            start: StartPolicy::Explicit,
            drain: DrainPolicy::StopWhenDrained,
        }
    }

    /// Arm on every intake and stay armed.
    pub fn video() -> Self {
        Self {
            start: StartPolicy::AutoArmOnIntake,
            drain: DrainPolicy::StayArmed,
        }
    }
}
