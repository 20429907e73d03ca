//! Blob metadata records and their validated descriptive schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Failure decoding descriptive metadata from its stored key/value form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata field `{0}` is missing")]
    Missing(&'static str),
    #[error("metadata field `{field}` is malformed: `{value}`")]
    Malformed { field: &'static str, value: String },
}

/// Descriptive metadata attached to every stored blob.
///
/// The store persists this as a string key/value map (the form external
/// storage backends speak); reads go through [`BlobMetadata::from_map`] so a
/// missing or malformed key is a typed failure instead of a silent default.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Identity that uploaded the blob.
    pub user_id: String,

    /// Logical (unsanitized) name of the content.
    pub name: String,

    /// Id of the catalog record this blob belongs to.
    pub source_id: Uuid,

    /// Whether the bytes have been through background removal.
    pub processed: bool,
}

const KEY_USER_ID: &str = "user_id";
const KEY_NAME: &str = "name";
const KEY_SOURCE_ID: &str = "source_id";
const KEY_PROCESSED: &str = "processed";

impl BlobMetadata {
    /// Decode from the stored key/value map, failing on missing or
    /// malformed required keys.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, MetadataError> {
        let user_id = require(map, KEY_USER_ID)?.to_string();
        let name = require(map, KEY_NAME)?.to_string();
        let source_id = require(map, KEY_SOURCE_ID)?;
        let source_id = source_id.parse().map_err(|_| MetadataError::Malformed {
            field: KEY_SOURCE_ID,
            value: source_id.to_string(),
        })?;
        let processed = require(map, KEY_PROCESSED)?;
        let processed = processed.parse().map_err(|_| MetadataError::Malformed {
            field: KEY_PROCESSED,
            value: processed.to_string(),
        })?;

        Ok(Self {
            user_id,
            name,
            source_id,
            processed,
        })
    }

    /// Encode to the key/value map form the store persists.
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (KEY_USER_ID.to_string(), self.user_id.clone()),
            (KEY_NAME.to_string(), self.name.clone()),
            (KEY_SOURCE_ID.to_string(), self.source_id.to_string()),
            (KEY_PROCESSED.to_string(), self.processed.to_string()),
        ])
    }
}

fn require<'a>(
    map: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, MetadataError> {
    map.get(key)
        .map(String::as_str)
        .ok_or(MetadataError::Missing(key))
}

/// Metadata for one stored blob.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BlobRecord {
    /// Logical path addressing the blob.
    pub path: String,

    /// Content type of the payload.
    pub content_type: String,

    /// Payload size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload.
    pub etag: String,

    /// Validated descriptive metadata.
    pub metadata: BlobMetadata,

    /// When the blob was stored.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlobMetadata {
        BlobMetadata {
            user_id: "u1".into(),
            name: "Coffee Mug".into(),
            source_id: Uuid::new_v4(),
            processed: true,
        }
    }

    #[test]
    fn map_round_trip() {
        let meta = sample();
        let decoded = BlobMetadata::from_map(&meta.to_map()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn missing_key_is_typed_failure() {
        let mut map = sample().to_map();
        map.remove("user_id");
        assert_eq!(
            BlobMetadata::from_map(&map),
            Err(MetadataError::Missing("user_id"))
        );
    }

    #[test]
    fn malformed_id_is_typed_failure() {
        let mut map = sample().to_map();
        map.insert("source_id".into(), "not-a-uuid".into());
        assert!(matches!(
            BlobMetadata::from_map(&map),
            Err(MetadataError::Malformed {
                field: "source_id",
                ..
            })
        ));
    }

    #[test]
    fn malformed_flag_is_typed_failure() {
        let mut map = sample().to_map();
        map.insert("processed".into(), "yes".into());
        assert!(matches!(
            BlobMetadata::from_map(&map),
            Err(MetadataError::Malformed {
                field: "processed",
                ..
            })
        ));
    }
}
