//! Catalog of scanned objects: registration, recency-ordered reads with an
//! orphan sweep, and live full-snapshot subscriptions.

use crate::{
    auth::UserId,
    models::object::ScannedObject,
    services::{
        blob_store::{BlobStore, BlobStoreError},
        snapshots::SnapshotHub,
    },
};
use chrono::Utc;
use futures::future::join_all;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Column list for `objects` queries.
const COLUMNS: &str = "id, user_id, name, sanitized_name, storage_path, image_url, status, \
     processed, date_scanned";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("object `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Per-user collection of scanned objects.
///
/// Reads are self-healing: an entry whose blob no longer resolves is
/// deleted as a side effect of the read and excluded from the result.
#[derive(Clone)]
pub struct ObjectCatalog {
    db: Arc<SqlitePool>,
    blobs: Arc<dyn BlobStore>,
    snapshots: Arc<SnapshotHub<ScannedObject>>,
}

impl ObjectCatalog {
    pub fn new(db: Arc<SqlitePool>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            blobs,
            snapshots: SnapshotHub::new(),
        }
    }

    /// Register a verified scan as a catalog entry.
    ///
    /// The creation time is server-assigned here; whatever the caller put in
    /// `date_scanned` is ignored.
    pub async fn register(&self, entry: &ScannedObject) -> CatalogResult<ScannedObject> {
        let query = format!(
            "INSERT INTO objects ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        let saved = sqlx::query_as::<_, ScannedObject>(&query)
            .bind(entry.id)
            .bind(&entry.user_id)
            .bind(&entry.name)
            .bind(&entry.sanitized_name)
            .bind(&entry.storage_path)
            .bind(&entry.image_url)
            .bind(entry.status)
            .bind(entry.processed)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await?;

        self.refresh_snapshot(&saved.user_id).await?;
        Ok(saved)
    }

    /// Current objects for a user, most recent first, pruning entries whose
    /// blob has gone missing.
    ///
    /// Verification fans out one resolution call per entry with no
    /// concurrency cap — acceptable at small catalog sizes.
    pub async fn list(&self, user: &UserId) -> CatalogResult<Vec<ScannedObject>> {
        let entries = self.fetch_all(user.as_str()).await?;

        let resolutions = join_all(
            entries
                .iter()
                .map(|entry| self.blobs.download_url(&entry.storage_path)),
        )
        .await;

        let mut kept = Vec::with_capacity(entries.len());
        let mut swept = false;
        for (entry, resolution) in entries.into_iter().zip(resolutions) {
            match resolution {
                Ok(_) => kept.push(entry),
                Err(BlobStoreError::NotFound(_)) => {
                    debug!(id = %entry.id, path = %entry.storage_path, "pruning orphan catalog entry");
                    sqlx::query("DELETE FROM objects WHERE id = ?")
                        .bind(entry.id)
                        .execute(&*self.db)
                        .await?;
                    swept = true;
                }
                Err(other) => return Err(CatalogError::Store(other)),
            }
        }

        if swept {
            self.snapshots.publish(user.as_str(), kept.clone());
        }
        Ok(kept)
    }

    /// Fetch one entry owned by `user`.
    pub async fn get(&self, user: &UserId, id: Uuid) -> CatalogResult<ScannedObject> {
        let query = format!("SELECT {COLUMNS} FROM objects WHERE id = ? AND user_id = ?");
        sqlx::query_as::<_, ScannedObject>(&query)
            .bind(id)
            .bind(user.as_str())
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => CatalogError::NotFound(id),
                other => CatalogError::Sqlx(other),
            })
    }

    /// Delete an entry and, best-effort, its blob.
    pub async fn delete(&self, user: &UserId, id: Uuid) -> CatalogResult<()> {
        let entry = self.get(user, id).await?;

        sqlx::query("DELETE FROM objects WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if let Err(err) = self.blobs.delete(&entry.storage_path).await {
            debug!(path = %entry.storage_path, error = %err, "blob already gone during catalog delete");
        }

        self.refresh_snapshot(user.as_str()).await?;
        Ok(())
    }

    /// Subscribe to full-snapshot updates of a user's objects. Every
    /// mutation delivers the complete current list, newest first.
    pub fn subscribe(&self, user: &UserId) -> watch::Receiver<Vec<ScannedObject>> {
        self.snapshots.subscribe(user.as_str())
    }

    async fn fetch_all(&self, user_id: &str) -> Result<Vec<ScannedObject>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM objects WHERE user_id = ? ORDER BY date_scanned DESC, id ASC"
        );
        sqlx::query_as::<_, ScannedObject>(&query)
            .bind(user_id)
            .fetch_all(&*self.db)
            .await
    }

    async fn refresh_snapshot(&self, user_id: &str) -> Result<(), sqlx::Error> {
        let current = self.fetch_all(user_id).await?;
        self.snapshots.publish(user_id, current);
        Ok(())
    }
}
