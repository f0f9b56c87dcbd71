use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SUPPORTED_VERSION: &str = "1.0";

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

/// Checks that a structurally valid config also makes sense. Also applied
/// to configs built in code, which never pass through the schema.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let base_url = config.api.base_url.trim();
    let host = base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))
        .unwrap_or_default();
    if host.trim_matches('/').is_empty() {
        return Err(ConfigError::Validation {
            message: format!(
                "api.baseUrl must be an http(s) URL with a host, got '{}'",
                base_url
            ),
        });
    }

    if config.api.request_timeout_secs == 0 || config.video.poll_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "api.requestTimeoutSecs and video.pollIntervalSecs must be positive"
                .to_string(),
        });
    }

    for (section, model) in [
        ("photo", &config.photo.model),
        ("video", &config.video.model),
    ] {
        if model.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{}.model must not be blank", section),
            });
        }
    }

    if config.queue.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "queue.eventCapacity must be positive".to_string(),
        });
    }

    for (section, types) in [
        ("photo", &config.photo.accepted_media_types),
        ("video", &config.video.accepted_media_types),
    ] {
        if types.is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{}.acceptedMediaTypes must not be empty", section),
            });
        }
        if let Some(bad) = types.iter().find(|t| !t.starts_with("image/")) {
            return Err(ConfigError::Validation {
                message: format!(
                    "{}.acceptedMediaTypes contains non-image type '{}'",
                    section, bad
                ),
            });
        }
    }

    Ok(())
}
