use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::ConfigError;
use crate::storage::StorageBackend;

/// The region used when a config does not name one.
pub const DEFAULT_REGION: &str = "ap-south-1";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfigs {
    S3 {
        #[serde(default = "default_region")]
        region: String,

        /// A custom endpoint for S3 compatible stores.
        #[serde(default)]
        endpoint: Option<String>,

        #[serde(default)]
        access_key: Option<String>,

        #[serde(default)]
        secret_key: Option<String>,
    },
    FileSystem {
        directory: PathBuf,
    },
}

impl BackendConfigs {
    pub async fn connect(&self) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        match self {
            Self::S3 {
                region,
                endpoint,
                access_key,
                secret_key,
            } => {
                let backend = super::blob_storage::BlobStorageBackend::new(
                    region,
                    endpoint.as_deref(),
                    access_key.as_deref(),
                    secret_key.as_deref(),
                )
                .await?;
                Ok(Arc::new(backend))
            },
            Self::FileSystem { directory } => {
                Ok(Arc::new(super::filesystem::FileSystemBackend::new(directory.clone())))
            },
        }
    }

    /// The public url objects written by this backend are reachable under.
    pub fn default_public_base_url(&self) -> Option<String> {
        match self {
            Self::S3 { endpoint: Some(endpoint), .. } => {
                Some(endpoint.trim_end_matches('/').to_string())
            },
            Self::S3 { region, .. } => Some(format!("https://s3.{}.amazonaws.com", region)),
            Self::FileSystem { .. } => None,
        }
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}
