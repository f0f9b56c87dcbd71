//! API key providers.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::ApiConfig;
use crate::error::CredentialError;
use crate::secrets::{resolve_secret, SecretError};

/// Supplies the API key for a remote call.
///
/// Called once per job, before any network traffic, so a missing key fails
/// the job with a [`CredentialError`] instead of an HTTP error.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn ensure_credential(&self) -> Result<SecretString, CredentialError>;
}

/// Resolves the key from config on every call: direct value, then file, then
/// environment variable. A key supplied after startup is picked up by the
/// next job.
#[derive(Clone)]
pub struct ConfiguredCredential {
    direct: Option<SecretString>,
    file: Option<String>,
    env_var: Option<String>,
}

impl ConfiguredCredential {
    pub fn new(direct: Option<String>, file: Option<String>, env_var: Option<String>) -> Self {
        Self {
            direct: direct.filter(|v| !v.is_empty()).map(SecretString::from),
            file: file.filter(|v| !v.is_empty()),
            env_var: env_var.filter(|v| !v.is_empty()),
        }
    }

    pub fn from_config(api: &ApiConfig) -> Self {
        Self::new(
            api.api_key.clone(),
            api.api_key_file.clone(),
            Some(api.api_key_env_var.clone()),
        )
    }

    fn resolve(&self) -> Result<SecretString, CredentialError> {
        let resolved = resolve_secret(
            self.direct.as_ref().map(|s| s.expose_secret()),
            self.file.as_deref(),
            self.env_var.as_deref(),
        );

        match resolved {
            Ok(secret) => Ok(secret),
            Err(SecretError::NotConfigured) => Err(CredentialError::Missing(
                "no API key configured".to_string(),
            )),
            Err(SecretError::EnvMissing { name }) => Err(CredentialError::Missing(format!(
                "set the {} environment variable",
                name
            ))),
            Err(e) => Err(CredentialError::Secret(e)),
        }
    }
}

#[async_trait]
impl CredentialProvider for ConfiguredCredential {
    async fn ensure_credential(&self) -> Result<SecretString, CredentialError> {
        self.resolve()
    }
}

impl std::fmt::Debug for ConfiguredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredCredential")
            .field("direct", &self.direct.as_ref().map(|_| "[REDACTED]"))
            .field("file", &self.file)
            .field("env_var", &self.env_var)
            .finish()
    }
}

/// A key known up front.
#[derive(Clone)]
pub struct StaticCredential(SecretString);

impl StaticCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn ensure_credential(&self) -> Result<SecretString, CredentialError> {
        if self.0.expose_secret().is_empty() {
            return Err(CredentialError::Missing("empty API key".to_string()));
        }
        Ok(self.0.clone())
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticCredential([REDACTED])")
    }
}
