//! Source payloads accepted at intake and artifacts produced by processing.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::IntakeError;

/// A file offered for intake, before validation.
#[derive(Clone)]
pub struct IntakeFile {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Media type declared by the caller. Advisory: the content is sniffed.
    pub media_type: Option<String>,
}

impl IntakeFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            media_type: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Reads a file from disk, guessing its media type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| IntakeError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            name,
            bytes,
            media_type: mime_guess::from_path(path).first().map(|m| m.to_string()),
        })
    }
}

impl fmt::Debug for IntakeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeFile")
            .field("name", &self.name)
            .field("bytes.len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

/// Validated original content of a batch item. Immutable after intake.
#[derive(Clone)]
pub struct SourcePayload {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl SourcePayload {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Validates an intake file against the accepted media types.
    ///
    /// The media type is taken from the content's magic bytes, so a
    /// mislabelled file is still classified by what it actually is.
    pub fn from_intake(file: IntakeFile, accepted: &[String]) -> Result<Self, IntakeError> {
        if file.bytes.is_empty() {
            return Err(IntakeError::Empty { name: file.name });
        }

        let format = image::guess_format(&file.bytes).map_err(|e| IntakeError::Unreadable {
            name: file.name.clone(),
            reason: e.to_string(),
        })?;
        let media_type = format.to_mime_type().to_string();

        if let Some(declared) = file.media_type.as_deref() {
            if !declared.is_empty() && declared != media_type {
                log::debug!(
                    "'{}' declared as {} but content is {}",
                    file.name,
                    declared,
                    media_type
                );
            }
        }

        if !accepted.iter().any(|a| a.eq_ignore_ascii_case(&media_type)) {
            return Err(IntakeError::UnsupportedMediaType {
                name: file.name,
                media_type,
            });
        }

        Ok(Self::new(file.name, media_type, file.bytes))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn preview_url(&self) -> String {
        data_url(&self.media_type, &self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SourcePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePayload")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes.len", &self.bytes.len())
            .finish()
    }
}

/// Output produced by a remote processor: a cleaned image or a generated video.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl Artifact {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Decodes a base64 body as returned inline by the remote service.
    pub fn from_base64(
        media_type: impl Into<String>,
        encoded: &str,
    ) -> Result<Self, base64::DecodeError> {
        Ok(Self::new(media_type, BASE64.decode(encoded.trim())?))
    }

    pub fn data_url(&self) -> String {
        data_url(&self.media_type, &self.bytes)
    }

    /// File extension for writing the artifact to disk.
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "video/mp4" => "mp4",
            other => mime_guess::get_mime_extensions_str(other)
                .and_then(|exts| exts.first().copied())
                .unwrap_or("bin"),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("media_type", &self.media_type)
            .field("bytes.len", &self.bytes.len())
            .finish()
    }
}

fn data_url(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", media_type, BASE64.encode(bytes))
}
