//! Backup settings
//!
//! Settings live in a small file next to the backup invocation. JSON is the
//! default format; files ending in `.toml` are read and written as TOML.
//! Every field is optional on disk and omitted when empty.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings file used when none is given on the command line
pub const DEFAULT_SETTINGS_FILE: &str = "backup.config";

/// Region written into generated settings
pub const DEFAULT_REGION: &str = "us-east-1";

/// Bucket written into generated settings
pub const DEFAULT_BUCKET: &str = "default-s3-backup-bucket";

/// Static credentials for the object store
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Auth {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub access_key: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub secret_key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl Auth {
    /// Read credentials through `lookup`, using the same variable names as
    /// the AWS tooling.
    pub fn from_env_with<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|&name| lookup(name))
                .find(|value| !value.is_empty())
        };

        let access_key = first(&["AWS_ACCESS_KEY_ID", "AWS_ACCESS_KEY"])?;
        let secret_key = first(&["AWS_SECRET_ACCESS_KEY", "AWS_SECRET_KEY"])?;

        Some(Self {
            access_key,
            secret_key,
            session_token: first(&["AWS_SESSION_TOKEN"]),
        })
    }

    /// True when nothing at all is configured
    pub fn is_empty(&self) -> bool {
        !self.has_keys() && self.session_token.is_none()
    }

    /// True when an access key or secret key is set
    pub fn has_keys(&self) -> bool {
        !self.access_key.is_empty() || !self.secret_key.is_empty()
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// User supplied backup options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub region: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub bucket: String,

    /// Custom endpoint for S3-compatible stores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Auth::is_empty")]
    pub auth: Auth,
}

/// On-disk encoding of a settings file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Json,
    Toml,
}

impl SettingsFormat {
    /// Pick the format from the file extension
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => SettingsFormat::Toml,
            _ => SettingsFormat::Json,
        }
    }
}

impl Settings {
    /// Read settings from a file
    ///
    /// Only the encoding is checked here; call `validate` for the values.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let settings = match SettingsFormat::for_path(path) {
            SettingsFormat::Json => serde_json::from_str(&content)?,
            SettingsFormat::Toml => toml::from_str(&content)?,
        };

        Ok(settings)
    }

    /// Write settings to a file
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match SettingsFormat::for_path(path) {
            SettingsFormat::Json => serde_json::to_string_pretty(self)?,
            SettingsFormat::Toml => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default settings with credentials taken from the process environment
    pub fn generate_default() -> Self {
        Self::generate_default_with(|name| std::env::var(name).ok())
    }

    /// Default settings with credentials taken from `lookup`
    pub fn generate_default_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth = Auth::from_env_with(lookup).unwrap_or_else(|| {
            tracing::warn!("No AWS credentials found in the environment");
            Auth::default()
        });

        Self {
            auth,
            region: DEFAULT_REGION.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            endpoint: None,
        }
    }

    /// Region to use, falling back to the default
    pub fn region_or_default(&self) -> &str {
        if self.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.region
        }
    }

    /// Reject values that can never work
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            let parsed = url::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("Invalid endpoint '{endpoint}': {e}")))?;

            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::Config(format!(
                    "Endpoint '{endpoint}' must use http or https"
                )));
            }
        }

        Ok(())
    }
}

/// Loads settings for a run, generating a default file when asked to
pub struct SettingsManager;

impl SettingsManager {
    /// Load settings from `path`.
    ///
    /// When the file cannot be read or parsed and `generate` is set,
    /// defaults are generated and written to `path`. A failed write is only
    /// logged; the generated settings are returned either way. A file that
    /// parses but holds invalid values is an error and is never overwritten.
    pub fn load(path: impl AsRef<Path>, generate: bool) -> Result<Settings> {
        let path = path.as_ref();

        match Settings::read(path) {
            Ok(settings) => {
                settings.validate().map_err(|e| match e {
                    Error::Config(msg) => {
                        Error::Config(format!("Invalid settings in '{}': {msg}", path.display()))
                    }
                    other => other,
                })?;
                tracing::debug!(path = %path.display(), "Loaded settings");
                Ok(settings)
            }
            Err(e) if generate => {
                tracing::warn!(path = %path.display(), error = %e, "Generating default settings");
                let settings = Settings::generate_default();
                if let Err(e) = settings.write(path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to save generated settings"
                    );
                }
                Ok(settings)
            }
            Err(e) => Err(Error::Config(format!(
                "Failed to load settings from '{}': {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn sample() -> Settings {
        Settings {
            auth: Auth {
                access_key: "AKIDEXAMPLE".to_string(),
                secret_key: "secret".to_string(),
                session_token: None,
            },
            region: "eu-west-1".to_string(),
            bucket: "nightly-backups".to_string(),
            endpoint: None,
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("backup.config");

        sample().write(&path).unwrap();
        let loaded = Settings::read(&path).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_toml_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("backup.toml");

        sample().write(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("bucket = \"nightly-backups\""));
        assert_eq!(Settings::read(&path).unwrap(), sample());
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert_eq!(json, "{}");

        let json = serde_json::to_string(&Settings {
            bucket: "b".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json, r#"{"bucket":"b"}"#);
    }

    #[test]
    fn test_missing_keys_default() {
        let settings: Settings = serde_json::from_str(r#"{"region":"us-west-2"}"#).unwrap();
        assert_eq!(settings.region, "us-west-2");
        assert!(settings.bucket.is_empty());
        assert!(settings.auth.is_empty());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("backup.config");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(Settings::read(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let settings = Settings {
            endpoint: Some("ftp://example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        let settings = Settings {
            endpoint: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_auth_from_env_primary_names() {
        let auth = Auth::from_env_with(env(&[
            ("AWS_ACCESS_KEY_ID", "id"),
            ("AWS_SECRET_ACCESS_KEY", "key"),
            ("AWS_SESSION_TOKEN", "tok"),
        ]))
        .unwrap();
        assert_eq!(auth.access_key, "id");
        assert_eq!(auth.secret_key, "key");
        assert_eq!(auth.session_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_auth_from_env_fallback_names() {
        let auth = Auth::from_env_with(env(&[
            ("AWS_ACCESS_KEY", "old-id"),
            ("AWS_SECRET_KEY", "old-key"),
        ]))
        .unwrap();
        assert_eq!(auth.access_key, "old-id");
        assert_eq!(auth.secret_key, "old-key");
        assert!(auth.session_token.is_none());
    }

    #[test]
    fn test_auth_from_env_missing_secret() {
        assert!(Auth::from_env_with(env(&[("AWS_ACCESS_KEY_ID", "id")])).is_none());
    }

    #[test]
    fn test_generate_default() {
        let settings = Settings::generate_default_with(env(&[]));
        assert_eq!(settings.region, DEFAULT_REGION);
        assert_eq!(settings.bucket, DEFAULT_BUCKET);
        assert!(settings.auth.is_empty());
    }

    #[test]
    fn test_auth_debug_redacts_secret() {
        let rendered = format!("{:?}", sample().auth);
        assert!(rendered.contains("AKIDEXAMPLE"));
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_load_missing_without_generate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.config");

        let result = SettingsManager::load(&path, false);
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_missing_with_generate_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.config");

        let settings = SettingsManager::load(&path, true).unwrap();
        assert_eq!(settings.bucket, DEFAULT_BUCKET);
        assert!(path.exists());

        let reloaded = Settings::read(&path).unwrap();
        assert_eq!(reloaded.bucket, DEFAULT_BUCKET);
        assert_eq!(reloaded.region, DEFAULT_REGION);
    }

    #[test]
    fn test_load_invalid_values_keeps_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("backup.config");
        let raw = serde_json::json!({
            "region": "eu-west-1",
            "bucket": "my-real-bucket",
            "endpoint": "localhost:9000",
            "auth": {"access_key": "id", "secret_key": "key"}
        })
        .to_string();
        std::fs::write(&path, &raw).unwrap();

        for generate in [false, true] {
            let result = SettingsManager::load(&path, generate);
            assert!(
                matches!(&result, Err(Error::Config(msg)) if msg.contains("localhost:9000")),
                "generate={generate}: {result:?}"
            );
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);
    }

    #[test]
    fn test_load_valid_file_with_generate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("backup.config");
        sample().write(&path).unwrap();

        assert_eq!(SettingsManager::load(&path, true).unwrap(), sample());
    }

    #[test]
    fn test_session_token_only_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            bucket: "backups".to_string(),
            auth: Auth {
                session_token: Some("tok".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!settings.auth.is_empty());
        assert!(!settings.auth.has_keys());

        for name in ["backup.config", "backup.toml"] {
            let path = temp_dir.path().join(name);
            settings.write(&path).unwrap();
            assert_eq!(Settings::read(&path).unwrap(), settings, "{name}");
        }
    }

    #[test]
    fn test_region_or_default() {
        assert_eq!(Settings::default().region_or_default(), DEFAULT_REGION);
        assert_eq!(sample().region_or_default(), "eu-west-1");
    }
}
