//! The upload-verify-register pipeline.
//!
//! Turns a captured photo into a published catalog entry: normalize the
//! image, optionally strip its background, upload with bounded retries,
//! confirm the store really holds the bytes, then register exactly one
//! catalog entry. Any failure after a confirmed upload unwinds with a
//! best-effort blob delete so a catalog entry never outlives its blob.

use crate::{
    auth::UserId,
    models::{
        blob::BlobMetadata,
        object::{ObjectStatus, ScannedObject},
    },
    services::{
        blob_store::{BlobStore, BlobStoreError},
        catalog::{CatalogError, ObjectCatalog},
        removal::{BackgroundRemover, RemovalError},
    },
};
use chrono::Utc;
use image::ImageFormat;
use std::{io::Cursor, sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("image could not be decoded")]
    InvalidImage(#[source] image::ImageError),
    #[error(transparent)]
    RemovalService(#[from] RemovalError),
    #[error("upload of `{path}` failed after {attempts} attempt(s)")]
    UploadFailed { path: String, attempts: u32 },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Bounded-retry settings for the upload-and-confirm stage.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): the base delay
    /// doubled per attempt, i.e. 2 s, 4 s, 8 s with the defaults.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Strip path separators and punctuation from a user-supplied name so it is
/// safe as a storage path component.
///
/// Whitespace collapses to underscores, everything outside
/// `[A-Za-z0-9_-]` is dropped, and a name with nothing left falls back to
/// `object`. Idempotent: sanitizing a sanitized name is a no-op.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "object".to_string()
    } else {
        cleaned
    }
}

/// Deterministic blob path for a scanned object.
pub fn storage_path(user: &UserId, id: Uuid, sanitized_name: &str) -> String {
    format!("users/{}/objects/{}_{}.png", user.as_str(), id, sanitized_name)
}

/// One failed upload-and-confirm round.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Store(#[from] BlobStoreError),
    #[error("store reported zero bytes for `{0}`")]
    EmptyUpload(String),
}

/// Orchestrates blob store, background removal, and catalog registration.
pub struct ScanPipeline {
    blobs: Arc<dyn BlobStore>,
    catalog: ObjectCatalog,
    remover: Option<Arc<dyn BackgroundRemover>>,
    retry: RetryPolicy,
    settle_delay: Duration,
}

impl ScanPipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        catalog: ObjectCatalog,
        remover: Option<Arc<dyn BackgroundRemover>>,
        retry: RetryPolicy,
        settle_delay: Duration,
    ) -> Self {
        Self {
            blobs,
            catalog,
            remover,
            retry,
            settle_delay,
        }
    }

    /// Run the full pipeline for one captured photo.
    ///
    /// Succeeds with the registered catalog entry, or fails with no catalog
    /// entry and (best-effort) no blob left behind. Two concurrent calls
    /// for the same user generate distinct ids and paths and cannot
    /// collide.
    pub async fn scan(
        &self,
        user: &UserId,
        name: &str,
        image_bytes: &[u8],
    ) -> Result<ScannedObject, PipelineError> {
        // Normalize to the PNG wire format; undecodable input is rejected
        // before anything touches the network.
        let decoded = image::load_from_memory(image_bytes).map_err(PipelineError::InvalidImage)?;
        let mut png = Vec::new();
        decoded
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(PipelineError::InvalidImage)?;

        let id = Uuid::new_v4();
        let sanitized_name = sanitize_name(name);
        let path = storage_path(user, id, &sanitized_name);

        // Background removal is a single shot: a vendor rejection is final.
        let processed = self.remover.is_some();
        if let Some(remover) = &self.remover {
            png = remover.remove(&png).await?;
        }

        let metadata = BlobMetadata {
            user_id: user.as_str().to_string(),
            name: name.to_string(),
            source_id: id,
            processed,
        };

        let mut uploaded = false;
        for attempt in 1..=self.retry.max_attempts {
            match self.upload_and_confirm(&path, &png, &metadata).await {
                Ok(()) => {
                    uploaded = true;
                    break;
                }
                Err(err) => {
                    let delay = self.retry.backoff_delay(attempt);
                    tracing::warn!(
                        %path,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "upload attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        if !uploaded {
            tracing::error!(%path, attempts = self.retry.max_attempts, "upload retries exhausted");
            return Err(PipelineError::UploadFailed {
                path,
                attempts: self.retry.max_attempts,
            });
        }

        // Let the store settle before minting a public reference; the
        // backing store is only eventually consistent.
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let image_url = match self.resolve_reference(&path).await {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(%path, error = %err, "post-upload verification failed, unwinding");
                self.cleanup_blob(&path).await;
                return Err(PipelineError::UploadFailed {
                    path,
                    attempts: self.retry.max_attempts,
                });
            }
        };

        let entry = ScannedObject {
            id,
            user_id: user.as_str().to_string(),
            name: name.to_string(),
            sanitized_name,
            storage_path: path.clone(),
            image_url,
            status: ObjectStatus::Completed,
            processed,
            date_scanned: Utc::now(),
        };
        match self.catalog.register(&entry).await {
            Ok(saved) => {
                tracing::info!(id = %saved.id, path = %saved.storage_path, "scan published");
                Ok(saved)
            }
            Err(err) => {
                self.cleanup_blob(&path).await;
                Err(err.into())
            }
        }
    }

    /// Write the bytes, then independently confirm the store holds them —
    /// a successful write call alone is not trusted.
    async fn upload_and_confirm(
        &self,
        path: &str,
        bytes: &[u8],
        metadata: &BlobMetadata,
    ) -> Result<(), AttemptError> {
        self.blobs
            .put(
                path,
                bytes::Bytes::copy_from_slice(bytes),
                "image/png",
                metadata,
            )
            .await?;

        let record = self.blobs.get_metadata(path).await?;
        if record.size_bytes == 0 {
            return Err(AttemptError::EmptyUpload(path.to_string()));
        }
        Ok(())
    }

    /// Resolve the durable download reference and re-confirm the blob is
    /// present. Fatal once the retry budget is spent.
    async fn resolve_reference(&self, path: &str) -> Result<String, AttemptError> {
        let url = self.blobs.download_url(path).await?;
        let record = self.blobs.get_metadata(path).await?;
        if record.size_bytes == 0 {
            return Err(AttemptError::EmptyUpload(path.to_string()));
        }
        Ok(url)
    }

    /// Best-effort removal of a blob we no longer want. A failure here may
    /// orphan the blob; the read-side sweep never resurrects it, so that is
    /// accepted.
    async fn cleanup_blob(&self, path: &str) {
        if let Err(err) = self.blobs.delete(path).await {
            tracing::warn!(%path, error = %err, "failed to remove blob while unwinding");
        }
    }
}
