//! Shared application state handed to every handler.
//!
//! Stores are constructed once at startup and passed by handle; nothing in
//! the service layer reaches for a global.

use crate::services::{
    alarm_store::AlarmStore, blob_store::DiskBlobStore, catalog::ObjectCatalog,
    pipeline::ScanPipeline,
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Metadata/catalog database.
    pub db: Arc<SqlitePool>,

    /// Concrete disk store, for streaming blob downloads and health probes.
    pub disk: Arc<DiskBlobStore>,

    /// The upload-verify-register pipeline.
    pub pipeline: Arc<ScanPipeline>,

    /// Scanned-object catalog.
    pub catalog: ObjectCatalog,

    /// Alarm store.
    pub alarms: AlarmStore,
}
