use std::time::Instant;

use bytes::Bytes;
use strum::{AsRefStr, Display};
use tracing_futures::Instrument;
use uuid::Uuid;

use crate::config::{CommitOrder, OptimizerSettings};
use crate::locator::{self, ResolveError, StorageLocator};
use crate::processor::{self, OptimizationPolicy, SourceFormat, TranscodeError, POLICY};
use crate::storage::{ObjectStoreGateway, StoreError};
use crate::utils::split_extension;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Resolve,
    Download,
    Transcode,
    Delete,
    Upload,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Download(StoreError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("failed to delete the original image: {0}")]
    Delete(StoreError),

    #[error("failed to upload the optimised image: {0}")]
    Upload(StoreError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Resolve(_) => Stage::Resolve,
            Self::Download(_) => Stage::Download,
            Self::Transcode(_) => Stage::Transcode,
            Self::Delete(_) => Stage::Delete,
            Self::Upload(_) => Stage::Upload,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Download(StoreError::NotFound(_)))
    }
}

#[derive(Debug)]
pub struct OptimizedImage {
    /// The public url the optimised image can be reached at.
    pub url: String,

    pub source: StorageLocator,

    pub output: StorageLocator,

    /// The size of the original object in bytes.
    pub original_size: usize,

    /// The size of the optimised object in bytes.
    pub optimized_size: usize,
}

/// Runs the resolve, download, transcode, delete and upload stages for
/// a single image, stopping at the first failure.
///
/// Nothing is rolled back when a later stage fails.
pub struct Optimizer {
    gateway: ObjectStoreGateway,
    settings: OptimizerSettings,
    policy: &'static OptimizationPolicy,
}

impl Optimizer {
    pub fn new(gateway: ObjectStoreGateway, settings: OptimizerSettings) -> Self {
        Self {
            gateway,
            settings,
            policy: &POLICY,
        }
    }

    #[inline]
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    pub async fn optimize(&self, raw_locator: &str) -> Result<OptimizedImage, PipelineError> {
        let span = info_span!("optimize", request_id = %Uuid::new_v4());
        self.run(raw_locator).instrument(span).await
    }

    async fn run(&self, raw_locator: &str) -> Result<OptimizedImage, PipelineError> {
        let source = locator::resolve(raw_locator)?;
        let output = self.output_locator(&source)?;

        let instant = Instant::now();
        let original = self
            .gateway
            .download(&source)
            .await
            .map_err(PipelineError::Download)?;
        debug!("Downloaded {} ({} bytes) in {:?}", source, original.len(), instant.elapsed());

        let original_size = original.len();
        let hint = SourceFormat::from_key(source.key());

        let instant = Instant::now();
        let transcoded = processor::spawn_transcode(original, hint, self.policy).await?;
        debug!(
            "Transcoded {} {}x{} from {} to {} {} (interlace: {}) in {:?}",
            source,
            transcoded.width,
            transcoded.height,
            transcoded.source,
            self.policy.colorspace,
            self.policy.target,
            transcoded.interlace,
            instant.elapsed(),
        );

        let optimized_size = transcoded.data.len();
        self.commit(&source, &output, transcoded.data).await?;

        let url = public_url(&self.settings.public_base_url, &output);
        info!(
            "Optimised {} -> {} ({} -> {} bytes)",
            source, output, original_size, optimized_size,
        );

        Ok(OptimizedImage {
            url,
            source,
            output,
            original_size,
            optimized_size,
        })
    }

    /// The optimised image keeps the original key minus its extension.
    fn output_locator(&self, source: &StorageLocator) -> Result<StorageLocator, PipelineError> {
        let (stem, _) = split_extension(source.key());
        Ok(StorageLocator::new(self.settings.optimized_bucket.as_str(), stem)?)
    }

    async fn commit(
        &self,
        source: &StorageLocator,
        output: &StorageLocator,
        data: Bytes,
    ) -> Result<(), PipelineError> {
        match self.settings.commit_order {
            CommitOrder::DeleteFirst => {
                self.gateway
                    .delete(source)
                    .await
                    .map_err(PipelineError::Delete)?;

                self.gateway.upload(output, data).await.map_err(|e| {
                    error!("Original {} was deleted but its replacement failed to upload", source);
                    PipelineError::Upload(e)
                })
            },
            CommitOrder::UploadFirst => {
                self.gateway
                    .upload(output, data)
                    .await
                    .map_err(PipelineError::Upload)?;

                // Same bucket and an extension-less key, the upload already
                // replaced the original.
                if source == output {
                    return Ok(());
                }

                self.gateway
                    .delete(source)
                    .await
                    .map_err(PipelineError::Delete)
            },
        }
    }
}

pub fn public_url(base: &str, locator: &StorageLocator) -> String {
    format!("{}/{}/{}", base, locator.container(), locator.key())
}
