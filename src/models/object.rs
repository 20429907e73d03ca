//! Catalog entry for a scanned object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of a catalog entry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ObjectStatus {
    Pending,
    Completed,
    Error,
}

/// A scanned object published to the catalog.
///
/// A row is only durable once the blob at `storage_path` has been confirmed
/// present via a metadata round-trip; rows whose blob has gone missing are
/// pruned on the next read.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct ScannedObject {
    /// Unique identifier, generated when the scan starts.
    pub id: Uuid,

    /// Identity that owns this object.
    pub user_id: String,

    /// Raw user-supplied label.
    pub name: String,

    /// Allow-listed form of `name` used in the storage path.
    pub sanitized_name: String,

    /// Blob path: `users/{user_id}/objects/{id}_{sanitized_name}.png`.
    pub storage_path: String,

    /// Resolved download reference, valid only after verification.
    pub image_url: String,

    /// Lifecycle state of the entry.
    pub status: ObjectStatus,

    /// Whether background removal succeeded for this image.
    pub processed: bool,

    /// Server-assigned creation time.
    pub date_scanned: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ObjectStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn status_round_trips() {
        for status in [
            ObjectStatus::Pending,
            ObjectStatus::Completed,
            ObjectStatus::Error,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            let back: ObjectStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }
}
