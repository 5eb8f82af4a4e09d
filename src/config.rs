use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::storage::backends::BackendConfigs;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required secret, please set the {0} environment variable")]
    MissingSecret(&'static str),

    #[error("storage credentials could not be resolved: {0}")]
    MissingCredentials(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOrder {
    /// Delete the original, then upload the optimised image.
    ///
    /// An upload failure after the delete leaves the source object gone
    /// with no replacement.
    DeleteFirst,

    /// Upload the optimised image, then delete the original.
    UploadFirst,
}

impl Default for CommitOrder {
    fn default() -> Self {
        Self::DeleteFirst
    }
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// The shared secret callers must send in the `token` header.
    ///
    /// The `API_TOKEN` environment variable takes priority over this.
    #[serde(default)]
    pub api_token: Option<String>,

    /// The bucket every optimised image is written to.
    pub optimized_bucket: String,

    /// The base of the url returned to callers.
    ///
    /// Defaults to the regional S3 endpoint for the S3 backend.
    #[serde(default)]
    pub public_base_url: Option<String>,

    #[serde(default)]
    pub commit_order: CommitOrder,

    /// The set storage backend configuration.
    pub backend: BackendConfigs,
}

impl RuntimeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(data)?;

        if cfg.optimized_bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("optimized_bucket must not be empty".to_string()));
        }

        Ok(cfg)
    }

    /// Picks the token given on the command line or environment, falling
    /// back to the config file. The server refuses to start without one.
    pub fn resolve_api_token(&self, overridden: Option<String>) -> Result<String, ConfigError> {
        overridden
            .filter(|token| !token.is_empty())
            .or_else(|| self.api_token.clone().filter(|token| !token.is_empty()))
            .ok_or(ConfigError::MissingSecret("API_TOKEN"))
    }

    pub fn resolve_public_base_url(&self) -> Result<String, ConfigError> {
        self.public_base_url
            .as_deref()
            .map(|base| base.trim_end_matches('/').to_string())
            .or_else(|| self.backend.default_public_base_url())
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "public_base_url must be set for the filesystem backend".to_string(),
                )
            })
    }

    pub fn settings(&self) -> Result<OptimizerSettings, ConfigError> {
        Ok(OptimizerSettings {
            optimized_bucket: self.optimized_bucket.clone(),
            public_base_url: self.resolve_public_base_url()?,
            commit_order: self.commit_order,
        })
    }
}

/// The resolved values the optimiser reads on every request.
#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub optimized_bucket: String,
    pub public_base_url: String,
    pub commit_order: CommitOrder,
}
