use async_trait::async_trait;
use bytes::Bytes;

use crate::locator::StorageLocator;
use crate::storage::StoreError;

#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    /// Writes the object, replacing anything already stored under the key.
    async fn store(
        &self,
        locator: &StorageLocator,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// Reads the object, `None` if nothing is stored under the key.
    async fn fetch(&self, locator: &StorageLocator) -> Result<Option<Bytes>, StoreError>;

    async fn delete(&self, locator: &StorageLocator) -> Result<(), StoreError>;
}
