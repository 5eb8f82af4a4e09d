use std::sync::Arc;

use bytes::Bytes;

use crate::locator::StorageLocator;

pub mod backends;
pub mod template;

pub use template::StorageBackend;

/// The content type every optimised object is written with.
pub const WEBP_CONTENT_TYPE: &str = "image/webp";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object {0} does not exist")]
    NotFound(StorageLocator),

    #[error("object {0} is empty")]
    EmptyObject(StorageLocator),

    #[error("object key {0:?} is not a valid storage path")]
    InvalidKey(String),

    #[error("remote storage failure: {0}")]
    Transport(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// The download, upload and delete capabilities the optimiser needs
/// from an object store.
///
/// Every call is a single attempt, failures are surfaced as-is.
#[derive(Clone)]
pub struct ObjectStoreGateway {
    backend: Arc<dyn StorageBackend>,
}

impl ObjectStoreGateway {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn download(&self, locator: &StorageLocator) -> Result<Bytes, StoreError> {
        debug!("Downloading object @ {}", locator);

        let data = self
            .backend
            .fetch(locator)
            .await?
            .ok_or_else(|| StoreError::NotFound(locator.clone()))?;

        if data.is_empty() {
            return Err(StoreError::EmptyObject(locator.clone()));
        }

        Ok(data)
    }

    pub async fn upload(&self, locator: &StorageLocator, data: Bytes) -> Result<(), StoreError> {
        debug!("Uploading {} bytes @ {}", data.len(), locator);
        self.backend.store(locator, data, WEBP_CONTENT_TYPE).await
    }

    pub async fn delete(&self, locator: &StorageLocator) -> Result<(), StoreError> {
        debug!("Deleting object @ {}", locator);
        self.backend.delete(locator).await
    }
}
