//! Defines routes for the scan catalog and alarm service.
//!
//! ## Structure
//! - **Scanned objects**
//!   - `POST   /objects?name=...` — run the upload-verify-register pipeline
//!   - `GET    /objects` — list current objects (prunes orphan entries)
//!   - `DELETE /objects/{id}` — remove an entry and its blob
//!
//! - **Alarms**
//!   - `POST   /alarms` — create an alarm
//!   - `GET    /alarms` — list alarms
//!   - `PATCH  /alarms/{id}/enabled` — toggle without touching other fields
//!   - `DELETE /alarms/{id}` — delete an alarm
//!   - `POST   /alarms/{id}/image` — attach an image (single unverified put)
//!
//! - **Blobs**
//!   - `GET    /blobs/{*path}` — stream a payload; the target of every
//!     minted download URL
//!
//! All routes except health and blob downloads require the caller identity
//! header injected by the upstream auth layer.

use crate::{
    handlers::{
        alarm_handlers::{
            attach_alarm_image, create_alarm, delete_alarm, list_alarms, toggle_alarm,
        },
        blob_handlers::download_blob,
        health_handlers::{healthz, readyz},
        object_handlers::{delete_object, list_objects, scan_object},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};

/// Build and return the router for all routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // scanned objects
        .route("/objects", post(scan_object).get(list_objects))
        .route("/objects/{id}", delete(delete_object))
        // alarms
        .route("/alarms", post(create_alarm).get(list_alarms))
        .route("/alarms/{id}", delete(delete_alarm))
        .route("/alarms/{id}/enabled", patch(toggle_alarm))
        .route("/alarms/{id}/image", post(attach_alarm_image))
        // blob downloads
        .route("/blobs/{*path}", get(download_blob))
}
