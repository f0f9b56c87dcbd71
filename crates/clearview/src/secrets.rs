//! API key lookup.
//!
//! Sources are tried in order: `apiKey`, then the file at `apiKeyFile`, then
//! the environment variable named by `apiKeyEnvVar` (`GEMINI_API_KEY` by
//! default). The first source that is set wins.

use std::path::PathBuf;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No API key source configured")]
    NotConfigured,

    #[error("Cannot read API key file {path:?}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} is not set")]
    EnvMissing { name: String },

    #[error("{name} is not valid UTF-8")]
    EnvNotUnicode { name: String },

    #[error("API key from {origin} is blank")]
    Blank { origin: &'static str },
}

/// Looks up the key from the first configured source.
///
/// Empty source settings count as unset. The value is trimmed, and a set
/// source that yields only whitespace is [`SecretError::Blank`] rather than a
/// fallthrough to the next source.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString, SecretError> {
    fn configured(source: Option<&str>) -> Option<&str> {
        source.filter(|s| !s.is_empty())
    }

    if let Some(value) = configured(direct) {
        return trimmed(value, "apiKey");
    }

    if let Some(raw) = configured(file_path) {
        let path = home_relative(raw);
        let content =
            std::fs::read_to_string(&path).map_err(|source| SecretError::KeyFile { path, source })?;
        return trimmed(&content, "apiKeyFile");
    }

    if let Some(name) = configured(env_var) {
        let value = std::env::var(name).map_err(|err| match err {
            std::env::VarError::NotPresent => SecretError::EnvMissing {
                name: name.to_string(),
            },
            std::env::VarError::NotUnicode(_) => SecretError::EnvNotUnicode {
                name: name.to_string(),
            },
        })?;
        return trimmed(&value, "environment");
    }

    Err(SecretError::NotConfigured)
}

fn trimmed(raw: &str, origin: &'static str) -> Result<SecretString, SecretError> {
    match raw.trim() {
        "" => Err(SecretError::Blank { origin }),
        key => Ok(SecretString::from(key.to_string())),
    }
}

/// Resolves a leading `~/` against the home directory.
fn home_relative(raw: &str) -> PathBuf {
    let rest = match raw {
        "~" => Some(""),
        _ => raw.strip_prefix("~/"),
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn key_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_inline_key_wins() {
        std::env::set_var("CLEARVIEW_KEY_INLINE", "from-env");
        let file = key_file("from-file");
        let key = resolve_secret(
            Some("inline"),
            file.path().to_str(),
            Some("CLEARVIEW_KEY_INLINE"),
        )
        .unwrap();
        assert_eq!(key.expose_secret(), "inline");
        std::env::remove_var("CLEARVIEW_KEY_INLINE");
    }

    #[test]
    #[serial]
    fn test_key_file_before_env() {
        std::env::set_var("CLEARVIEW_KEY_FILE_FIRST", "from-env");
        let file = key_file("  from-file  ");
        let key = resolve_secret(None, file.path().to_str(), Some("CLEARVIEW_KEY_FILE_FIRST"))
            .unwrap();
        assert_eq!(key.expose_secret(), "from-file");
        std::env::remove_var("CLEARVIEW_KEY_FILE_FIRST");
    }

    #[test]
    #[serial]
    fn test_env_key_is_trimmed() {
        std::env::set_var("CLEARVIEW_KEY_ENV", "from-env\n");
        let key = resolve_secret(Some(""), Some(""), Some("CLEARVIEW_KEY_ENV")).unwrap();
        assert_eq!(key.expose_secret(), "from-env");
        std::env::remove_var("CLEARVIEW_KEY_ENV");
    }

    #[test]
    #[serial]
    fn test_whitespace_key_is_blank() {
        std::env::set_var("CLEARVIEW_KEY_BLANK", "   ");
        let err = resolve_secret(None, None, Some("CLEARVIEW_KEY_BLANK")).unwrap_err();
        assert!(matches!(err, SecretError::Blank { origin: "environment" }));
        std::env::remove_var("CLEARVIEW_KEY_BLANK");

        let err = resolve_secret(Some(" "), None, None).unwrap_err();
        assert!(matches!(err, SecretError::Blank { origin: "apiKey" }));
    }

    #[test]
    fn test_missing_sources() {
        assert!(matches!(
            resolve_secret(None, None, None),
            Err(SecretError::NotConfigured)
        ));
        assert!(matches!(
            resolve_secret(None, Some("/no/such/clearview.key"), None),
            Err(SecretError::KeyFile { .. })
        ));

        let err = resolve_secret(None, None, Some("CLEARVIEW_KEY_NEVER_SET")).unwrap_err();
        assert!(matches!(err, SecretError::EnvMissing { ref name } if name == "CLEARVIEW_KEY_NEVER_SET"));
        assert_eq!(err.to_string(), "CLEARVIEW_KEY_NEVER_SET is not set");
    }

    #[test]
    fn test_home_relative_paths() {
        assert_eq!(home_relative("/run/secrets/gemini"), PathBuf::from("/run/secrets/gemini"));
        assert_eq!(home_relative("keys/gemini"), PathBuf::from("keys/gemini"));
        assert_eq!(home_relative("~other/key"), PathBuf::from("~other/key"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(home_relative("~/.gemini"), home.join(".gemini"));
            assert_eq!(home_relative("~"), home);
        }
    }
}
