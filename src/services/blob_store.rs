//! Blob storage behind the [`BlobStore`] seam.
//!
//! [`DiskBlobStore`] keeps durable metadata in SQLite and payload bytes on
//! local disk beneath `base_path/{path}`. The seam is a trait so the scan
//! pipeline and catalog can run against fakes in tests, and so the disk
//! implementation could be swapped for a remote store without touching
//! callers.

use crate::models::blob::{BlobMetadata, BlobRecord, MetadataError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_BLOB_PATH_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob path")]
    InvalidPath,
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobStoreError>;

/// Path-addressed blob storage.
///
/// Paths are hierarchical (`users/{user}/objects/{file}`); `download_url`
/// only resolves for blobs whose payload is actually present, which is what
/// makes it usable as an existence probe.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, overwriting any previous blob there.
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> BlobResult<BlobRecord>;

    /// Fetch metadata, confirming the payload itself is still present.
    async fn get_metadata(&self, path: &str) -> BlobResult<BlobRecord>;

    /// Resolve a durable download reference for an existing blob.
    async fn download_url(&self, path: &str) -> BlobResult<String>;

    /// Delete the blob. `NotFound` if no such blob exists.
    async fn delete(&self, path: &str) -> BlobResult<()>;

    /// List blob paths under a prefix, lexicographically ordered.
    async fn list(&self, prefix: &str) -> BlobResult<Vec<String>>;
}

/// Row shape for the `blobs` table. Descriptive metadata is stored as the
/// loose key/value map and validated into [`BlobMetadata`] on the way out.
#[derive(sqlx::FromRow)]
struct BlobRow {
    path: String,
    content_type: String,
    size_bytes: i64,
    etag: String,
    metadata: sqlx::types::Json<HashMap<String, String>>,
    created_at: DateTime<Utc>,
}

impl BlobRow {
    fn into_record(self) -> Result<BlobRecord, MetadataError> {
        let metadata = BlobMetadata::from_map(&self.metadata.0)?;
        Ok(BlobRecord {
            path: self.path,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            etag: self.etag,
            metadata,
            created_at: self.created_at,
        })
    }
}

/// Blob store backed by SQLite metadata and local-disk payloads.
#[derive(Clone)]
pub struct DiskBlobStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where blob payloads are stored.
    pub base_path: PathBuf,

    /// External base URL download references are minted under.
    public_base_url: String,
}

impl DiskBlobStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            db,
            base_path: base_path.into(),
            public_base_url,
        }
    }

    /// Basic path validation to avoid trivial traversal vectors.
    ///
    /// Rejects paths that begin with `/` or contain `..`, control bytes,
    /// or backslashes.
    fn ensure_path_safe(&self, path: &str) -> BlobResult<()> {
        if path.is_empty() || path.len() > MAX_BLOB_PATH_LEN {
            return Err(BlobStoreError::InvalidPath);
        }
        if path.starts_with('/') || path.contains("..") {
            return Err(BlobStoreError::InvalidPath);
        }
        if path
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(BlobStoreError::InvalidPath);
        }
        Ok(())
    }

    /// Physical location of a blob's payload.
    fn payload_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    async fn fetch_row(&self, path: &str) -> BlobResult<BlobRow> {
        sqlx::query_as::<_, BlobRow>(
            "SELECT path, content_type, size_bytes, etag, metadata, created_at
             FROM blobs WHERE path = ?",
        )
        .bind(path)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => BlobStoreError::NotFound(path.to_string()),
            other => BlobStoreError::Sqlx(other),
        })
    }

    /// Fetch a blob for reading: metadata plus an opened file handle ready
    /// for streaming out. `NotFound` if the payload file is missing even
    /// though a metadata row exists.
    pub async fn get_reader(&self, path: &str) -> BlobResult<(BlobRecord, File)> {
        self.ensure_path_safe(path)?;
        let record = self.fetch_row(path).await?.into_record()?;

        let file_path = self.payload_path(path);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BlobStoreError::NotFound(path.to_string())
            } else {
                BlobStoreError::Io(err)
            }
        })?;

        Ok((record, file))
    }

    /// Recursively remove empty directories up to the storage root.
    ///
    /// Stops on the first non-empty or missing directory.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    /// Write the payload to disk and upsert the metadata row.
    ///
    /// Bytes go to a temporary file first and are fsynced before an atomic
    /// rename into the final location; temp files are cleaned up on error.
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> BlobResult<BlobRecord> {
        self.ensure_path_safe(path)?;

        let file_path = self.payload_path(path);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BlobStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let write_result = async {
            file.write_all(&bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = write_result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlobStoreError::Io(err));
            }
        }

        let etag = format!("{:x}", md5::compute(&bytes));
        let created_at = Utc::now();

        let insert_result = sqlx::query_as::<_, BlobRow>(
            r#"
            INSERT INTO blobs (path, content_type, size_bytes, etag, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                metadata = excluded.metadata,
                created_at = excluded.created_at
            RETURNING path, content_type, size_bytes, etag, metadata, created_at
            "#,
        )
        .bind(path)
        .bind(content_type)
        .bind(bytes.len() as i64)
        .bind(&etag)
        .bind(sqlx::types::Json(metadata.to_map()))
        .bind(created_at)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(row) => Ok(row.into_record()?),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(BlobStoreError::Sqlx(err))
            }
        }
    }

    /// Fetch metadata and confirm the payload file is still on disk.
    async fn get_metadata(&self, path: &str) -> BlobResult<BlobRecord> {
        self.ensure_path_safe(path)?;
        let record = self.fetch_row(path).await?.into_record()?;

        match fs::metadata(self.payload_path(path)).await {
            Ok(_) => Ok(record),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(path.to_string()))
            }
            Err(err) => Err(BlobStoreError::Io(err)),
        }
    }

    async fn download_url(&self, path: &str) -> BlobResult<String> {
        self.get_metadata(path).await?;
        Ok(format!("{}/blobs/{}", self.public_base_url, path))
    }

    /// Remove the metadata row, then the payload best-effort, then any
    /// directories the deletion emptied.
    async fn delete(&self, path: &str) -> BlobResult<()> {
        self.ensure_path_safe(path)?;

        let result = sqlx::query("DELETE FROM blobs WHERE path = ?")
            .bind(path)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BlobStoreError::NotFound(path.to_string()));
        }

        let file_path = self.payload_path(path);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload file {} already missing", file_path.display());
            }
            Err(err) => return Err(BlobStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }

        Ok(())
    }

    async fn list(&self, prefix: &str) -> BlobResult<Vec<String>> {
        let paths = sqlx::query_scalar::<_, String>(
            "SELECT path FROM blobs WHERE path LIKE ? ORDER BY path ASC",
        )
        .bind(format!("{}%", prefix))
        .fetch_all(&*self.db)
        .await?;
        Ok(paths)
    }
}

/// In-memory fakes for tests, with injectable failures.
#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// In-memory [`BlobStore`] with counters and failure injection knobs.
    pub struct MemoryBlobStore {
        blobs: Mutex<HashMap<String, (Bytes, BlobRecord)>>,
        pub put_calls: AtomicU32,
        pub delete_calls: AtomicU32,
        /// Number of upcoming `put` calls that fail with an I/O error.
        pub fail_next_puts: AtomicU32,
        /// When set, `download_url` reports the blob missing.
        pub fail_downloads: AtomicBool,
    }

    impl MemoryBlobStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                blobs: Mutex::new(HashMap::new()),
                put_calls: AtomicU32::new(0),
                delete_calls: AtomicU32::new(0),
                fail_next_puts: AtomicU32::new(0),
                fail_downloads: AtomicBool::new(false),
            })
        }

        pub async fn contains(&self, path: &str) -> bool {
            self.blobs.lock().await.contains_key(path)
        }

        /// Simulate an out-of-band deletion (e.g. another client or a
        /// lifecycle rule removing the blob).
        pub async fn remove_externally(&self, path: &str) {
            self.blobs.lock().await.remove(path);
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(
            &self,
            path: &str,
            bytes: Bytes,
            content_type: &str,
            metadata: &BlobMetadata,
        ) -> BlobResult<BlobRecord> {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_next_puts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BlobStoreError::Io(io::Error::new(
                    ErrorKind::Other,
                    "injected transient put failure",
                )));
            }

            let record = BlobRecord {
                path: path.to_string(),
                content_type: content_type.to_string(),
                size_bytes: bytes.len() as i64,
                etag: format!("{:x}", md5::compute(&bytes)),
                metadata: metadata.clone(),
                created_at: Utc::now(),
            };
            self.blobs
                .lock()
                .await
                .insert(path.to_string(), (bytes, record.clone()));
            Ok(record)
        }

        async fn get_metadata(&self, path: &str) -> BlobResult<BlobRecord> {
            self.blobs
                .lock()
                .await
                .get(path)
                .map(|(_, record)| record.clone())
                .ok_or_else(|| BlobStoreError::NotFound(path.to_string()))
        }

        async fn download_url(&self, path: &str) -> BlobResult<String> {
            if self.fail_downloads.load(Ordering::SeqCst) {
                return Err(BlobStoreError::NotFound(path.to_string()));
            }
            if !self.blobs.lock().await.contains_key(path) {
                return Err(BlobStoreError::NotFound(path.to_string()));
            }
            Ok(format!("memory:///{}", path))
        }

        async fn delete(&self, path: &str) -> BlobResult<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            match self.blobs.lock().await.remove(path) {
                Some(_) => Ok(()),
                None => Err(BlobStoreError::NotFound(path.to_string())),
            }
        }

        async fn list(&self, prefix: &str) -> BlobResult<Vec<String>> {
            let mut paths: Vec<String> = self
                .blobs
                .lock()
                .await
                .keys()
                .filter(|p| p.starts_with(prefix))
                .cloned()
                .collect();
            paths.sort();
            Ok(paths)
        }
    }
}
