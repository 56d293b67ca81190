use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EnvSource;
use crate::error::ConfigError;

pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Endpoint of the GCS XML API, which accepts S3 requests signed with HMAC keys.
pub const GCS_INTEROP_ENDPOINT: &str = "https://storage.googleapis.com";

/// Object storage client settings.
///
/// Without an access key pair the client falls back to the default AWS
/// credential chain (environment, profile, instance metadata).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "****"))
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_S3_REGION.to_string(),
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

impl StorageConfig {
    /// Reads `S3_ENDPOINT`, `S3_REGION`, `S3_ACCESS_KEY`/`AWS_ACCESS_KEY_ID`,
    /// `S3_SECRET_KEY`/`AWS_SECRET_ACCESS_KEY` and `S3_PATH_STYLE`.
    pub(crate) fn from_source(env: &EnvSource<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: env.optional("S3_ENDPOINT"),
            region: env
                .optional("S3_REGION")
                .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            access_key: env
                .optional("S3_ACCESS_KEY")
                .or_else(|| env.optional("AWS_ACCESS_KEY_ID")),
            secret_key: env
                .optional("S3_SECRET_KEY")
                .or_else(|| env.optional("AWS_SECRET_ACCESS_KEY")),
            path_style: env.parsed("S3_PATH_STYLE", false)?,
        })
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
            ..Self::default()
        }
    }

    /// GCS through its S3-compatible endpoint, using HMAC credentials
    pub fn for_gcs(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            endpoint: Some(GCS_INTEROP_ENDPOINT.to_string()),
            region: "auto".to_string(),
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            path_style: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::invalid("S3_REGION", "region cannot be empty"));
        }

        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    "S3_ENDPOINT",
                    format!("{endpoint:?} is not an http(s) URL"),
                ));
            }
        }

        match (&self.access_key, &self.secret_key) {
            (Some(_), None) => Err(ConfigError::Missing("S3_SECRET_KEY")),
            (None, Some(_)) => Err(ConfigError::Missing("S3_ACCESS_KEY")),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<StorageConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let lookup = |key: &str| map.get(key).cloned();
        StorageConfig::from_source(&EnvSource::new(&lookup))
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, StorageConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_aws_key_fallback() {
        let config = load(&[
            ("AWS_ACCESS_KEY_ID", "id"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("S3_PATH_STYLE", "true"),
        ])
        .unwrap();
        assert_eq!(config.access_key.as_deref(), Some("id"));
        assert_eq!(config.secret_key.as_deref(), Some("secret"));
        assert!(config.path_style);
    }

    #[test]
    fn test_invalid_path_style() {
        assert!(matches!(
            load(&[("S3_PATH_STYLE", "sometimes")]),
            Err(ConfigError::Invalid { name: "S3_PATH_STYLE", .. })
        ));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let config = StorageConfig {
            access_key: Some("id".to_string()),
            ..StorageConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Missing("S3_SECRET_KEY")));
    }

    #[test]
    fn test_debug_masks_secret_key() {
        let config = StorageConfig::for_gcs("GOOG1E", "hmac-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hmac-secret"));
        assert!(rendered.contains(r#"secret_key: Some("****")"#));
        assert!(rendered.contains("GOOG1E"));

        let rendered = format!("{:?}", StorageConfig::default());
        assert!(rendered.contains("secret_key: None"));
    }

    #[test]
    fn test_presets() {
        let minio = StorageConfig::for_minio("http://localhost:9000");
        assert!(minio.path_style);
        assert!(minio.validate().is_ok());

        let gcs = StorageConfig::for_gcs("GOOG1E", "hmac-secret");
        assert_eq!(gcs.endpoint.as_deref(), Some(GCS_INTEROP_ENDPOINT));
        assert!(gcs.validate().is_ok());

        let bad = StorageConfig {
            endpoint: Some("localhost:9000".to_string()),
            ..StorageConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
