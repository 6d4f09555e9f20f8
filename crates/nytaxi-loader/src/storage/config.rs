use nytaxi_common::{NytaxiError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_BUCKET: &str = "nytaxi-dataset";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_CREDENTIALS_FILE: &str = "service-account.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static keys are read from here when the file exists
    pub credentials_file: PathBuf,
    pub path_style: bool,
}

/// Contents of the credentials file
#[derive(Clone, Deserialize)]
pub struct StaticKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeys")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum CredentialsSource {
    File(StaticKeys),
    /// Environment, profile, or instance metadata via the default chain
    Ambient,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
            credentials_file: env::var("S3_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CREDENTIALS_FILE)),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_REGION.to_string(),
            bucket: bucket.into(),
            credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            path_style: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(NytaxiError::config("bucket name cannot be empty"));
        }
        if self.region.is_empty() {
            return Err(NytaxiError::config("region cannot be empty"));
        }
        Ok(())
    }

    /// Use the credentials file if present, otherwise fall back to the
    /// ambient default chain.
    pub fn resolve_credentials(&self) -> Result<CredentialsSource> {
        if !self.credentials_file.exists() {
            warn!(
                path = %self.credentials_file.display(),
                "Credentials file not found, falling back to default credentials"
            );
            return Ok(CredentialsSource::Ambient);
        }

        read_keys(&self.credentials_file).map(CredentialsSource::File)
    }
}

fn read_keys(path: &Path) -> Result<StaticKeys> {
    let raw = std::fs::read_to_string(path)?;
    let keys: StaticKeys = serde_json::from_str(&raw)?;

    if keys.access_key_id.is_empty() || keys.secret_access_key.is_empty() {
        return Err(NytaxiError::Credentials(format!(
            "{} has an empty access key or secret",
            path.display()
        )));
    }

    Ok(keys)
}
