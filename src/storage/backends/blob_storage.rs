use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use rusoto_core::credential::{DefaultCredentialsProvider, ProvideAwsCredentials, StaticProvider};
use rusoto_core::{HttpClient, Region, RusotoError};
use rusoto_s3::{
    DeleteObjectRequest,
    GetObjectError,
    GetObjectRequest,
    PutObjectRequest,
    S3Client,
    S3,
};

use crate::config::ConfigError;
use crate::locator::StorageLocator;
use crate::storage::{StorageBackend, StoreError};

pub struct BlobStorageBackend {
    client: S3Client,
}

impl BlobStorageBackend {
    /// Builds the shared S3 client.
    ///
    /// Without static keys the default AWS credential chain is used, it is
    /// resolved once here so a missing credential stops start up instead
    /// of failing the first request.
    pub async fn new(
        region: &str,
        endpoint: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                name: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region
                .parse::<Region>()
                .map_err(|e| ConfigError::Invalid(format!("unknown region {:?}: {}", region, e)))?,
        };

        let dispatcher = HttpClient::new().map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let client = match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let provider =
                    StaticProvider::new_minimal(access_key.to_string(), secret_key.to_string());
                S3Client::new_with(dispatcher, provider, region)
            },
            (None, None) => {
                let provider = DefaultCredentialsProvider::new()
                    .map_err(|e| ConfigError::MissingCredentials(e.to_string()))?;
                provider
                    .credentials()
                    .await
                    .map_err(|e| ConfigError::MissingCredentials(e.to_string()))?;
                S3Client::new_with(dispatcher, provider, region)
            },
            _ => {
                return Err(ConfigError::MissingCredentials(
                    "access_key and secret_key must be given together".to_string(),
                ))
            },
        };

        Ok(Self { client })
    }
}

fn transport<E: std::error::Error + 'static>(e: RusotoError<E>) -> StoreError {
    StoreError::Transport(e.to_string())
}

#[async_trait]
impl StorageBackend for BlobStorageBackend {
    async fn store(
        &self,
        locator: &StorageLocator,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        debug!("Storing object in bucket @ {}", locator);

        let request = PutObjectRequest {
            bucket: locator.container().to_string(),
            key: locator.key().to_string(),
            content_length: Some(data.len() as i64),
            content_type: Some(content_type.to_string()),
            body: Some(data.to_vec().into()),
            ..Default::default()
        };

        self.client.put_object(request).await.map_err(transport)?;
        Ok(())
    }

    async fn fetch(&self, locator: &StorageLocator) -> Result<Option<Bytes>, StoreError> {
        debug!("Retrieving object in bucket @ {}", locator);

        let request = GetObjectRequest {
            bucket: locator.container().to_string(),
            key: locator.key().to_string(),
            ..Default::default()
        };

        let output = match self.client.get_object(request).await {
            Ok(output) => output,
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => return Ok(None),
            Err(RusotoError::Unknown(ref resp)) if resp.status.as_u16() == 404 => return Ok(None),
            Err(other) => return Err(transport(other)),
        };

        let mut body = match output.body {
            Some(body) => body,
            None => return Ok(Some(Bytes::new())),
        };

        let mut buff = BytesMut::with_capacity(output.content_length.unwrap_or(0).max(0) as usize);
        while let Some(chunk) = body.try_next().await? {
            buff.extend_from_slice(&chunk);
        }

        Ok(Some(buff.freeze()))
    }

    async fn delete(&self, locator: &StorageLocator) -> Result<(), StoreError> {
        debug!("Purging object in bucket @ {}", locator);

        let request = DeleteObjectRequest {
            bucket: locator.container().to_string(),
            key: locator.key().to_string(),
            ..Default::default()
        };

        self.client.delete_object(request).await.map_err(transport)?;
        Ok(())
    }
}
