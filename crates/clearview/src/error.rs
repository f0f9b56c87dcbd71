use std::path::PathBuf;
use thiserror::Error;

use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum ClearviewError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config does not match the schema: {errors}")]
    SchemaValidation { errors: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Rejection of a single file during intake. Other files in the same batch
/// are unaffected.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("File '{name}' is empty")]
    Empty { name: String },

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File '{name}' is not a readable image: {reason}")]
    Unreadable { name: String, reason: String },

    #[error("File '{name}' has unsupported media type '{media_type}'")]
    UnsupportedMediaType { name: String, media_type: String },
}

/// Failure to obtain the credential the remote service requires.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("API key not available: {0}")]
    Missing(String),

    #[error("Failed to resolve API key: {0}")]
    Secret(#[from] SecretError),
}

/// Failure reported by a remote processor. The `Display` output becomes the
/// item's error text, so operation errors are rendered verbatim.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Remote service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Operation(String),

    #[error("{0}")]
    MissingArtifact(String),

    #[error("Failed to download generated video")]
    Download,

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Failed to decode response payload: {0}")]
    Decode(String),
}

impl ProcessError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        ProcessError::Transport(err.to_string())
    }

    pub fn missing_artifact(msg: impl Into<String>) -> Self {
        ProcessError::MissingArtifact(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("'{operation}' is not available in {mode} mode")]
    UnsupportedInMode {
        operation: &'static str,
        mode: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ClearviewError>;
