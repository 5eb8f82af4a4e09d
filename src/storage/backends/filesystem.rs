use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::locator::StorageLocator;
use crate::storage::{StorageBackend, StoreError};

/// Stores objects as plain files under `<directory>/<bucket>/<key>`.
pub struct FileSystemBackend {
    directory: PathBuf,
}

impl FileSystemBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { directory: dir }
    }

    fn format_path(&self, locator: &StorageLocator) -> Result<PathBuf, StoreError> {
        let mut path = self.directory.clone();
        for part in [locator.container(), locator.key()] {
            for component in Path::new(part).components() {
                match component {
                    Component::Normal(segment) => path.push(segment),
                    Component::CurDir => continue,
                    _ => return Err(StoreError::InvalidKey(part.to_string())),
                }
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    async fn store(
        &self,
        locator: &StorageLocator,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        let path = self.format_path(locator)?;

        debug!("Storing object @ {:?}", &path);
        match tokio::fs::write(&path, &data).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, data).await?;
                Ok(())
            },
            Err(other) => Err(other.into()),
        }
    }

    async fn fetch(&self, locator: &StorageLocator) -> Result<Option<Bytes>, StoreError> {
        let path = self.format_path(locator)?;

        debug!("Retrieving object @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn delete(&self, locator: &StorageLocator) -> Result<(), StoreError> {
        let path = self.format_path(locator)?;

        debug!("Purging object @ {:?}", &path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(locator.clone()))
            },
            Err(other) => Err(other.into()),
        }
    }
}
