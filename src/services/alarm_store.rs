//! Durable CRUD over alarm records, with optional image attachments and
//! live full-snapshot subscriptions.
//!
//! Unlike the scan pipeline, alarm operations are direct single-shot
//! writes: no retry, no post-upload verification, and reads do not sweep
//! for orphans.

use crate::{
    auth::UserId,
    models::{
        alarm::{Alarm, AlarmTime, Weekday},
        blob::BlobMetadata,
    },
    services::{
        blob_store::{BlobStore, BlobStoreError},
        snapshots::SnapshotHub,
    },
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::{collections::BTreeSet, sync::Arc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Column list for `alarms` queries.
const COLUMNS: &str = "id, user_id, time_minutes, label, days, enabled, image_path, created_at";

#[derive(Debug, Error)]
pub enum AlarmStoreError {
    #[error("alarm `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

pub type AlarmResult<T> = Result<T, AlarmStoreError>;

/// Fields for a new alarm.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAlarm {
    pub time: AlarmTime,
    pub label: String,
    #[serde(default)]
    pub days: BTreeSet<Weekday>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Per-user collection of alarms.
#[derive(Clone)]
pub struct AlarmStore {
    db: Arc<SqlitePool>,
    blobs: Arc<dyn BlobStore>,
    snapshots: Arc<SnapshotHub<Alarm>>,
}

impl AlarmStore {
    pub fn new(db: Arc<SqlitePool>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            blobs,
            snapshots: SnapshotHub::new(),
        }
    }

    pub async fn create(&self, user: &UserId, new: NewAlarm) -> AlarmResult<Alarm> {
        let query = format!(
            "INSERT INTO alarms ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        let alarm = sqlx::query_as::<_, Alarm>(&query)
            .bind(Uuid::new_v4())
            .bind(user.as_str())
            .bind(new.time.total_minutes() as i64)
            .bind(&new.label)
            .bind(sqlx::types::Json(&new.days))
            .bind(new.enabled)
            .bind(None::<String>)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await?;

        self.refresh_snapshot(user).await?;
        Ok(alarm)
    }

    /// Current alarms for a user, most recently created first.
    pub async fn list(&self, user: &UserId) -> AlarmResult<Vec<Alarm>> {
        Ok(self.fetch_all(user).await?)
    }

    pub async fn get(&self, user: &UserId, id: Uuid) -> AlarmResult<Alarm> {
        let query = format!("SELECT {COLUMNS} FROM alarms WHERE id = ? AND user_id = ?");
        sqlx::query_as::<_, Alarm>(&query)
            .bind(id)
            .bind(user.as_str())
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => AlarmStoreError::NotFound(id),
                other => AlarmStoreError::Sqlx(other),
            })
    }

    /// Flip only the `enabled` column; every other field is untouched.
    pub async fn set_enabled(&self, user: &UserId, id: Uuid, enabled: bool) -> AlarmResult<Alarm> {
        let result = sqlx::query("UPDATE alarms SET enabled = ? WHERE id = ? AND user_id = ?")
            .bind(enabled)
            .bind(id)
            .bind(user.as_str())
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AlarmStoreError::NotFound(id));
        }

        self.refresh_snapshot(user).await?;
        self.get(user, id).await
    }

    /// Delete the alarm and, best-effort, its attached image.
    pub async fn delete(&self, user: &UserId, id: Uuid) -> AlarmResult<()> {
        let alarm = self.get(user, id).await?;

        sqlx::query("DELETE FROM alarms WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if let Some(image_path) = &alarm.image_path {
            if let Err(err) = self.blobs.delete(image_path).await {
                debug!(path = %image_path, error = %err, "attachment already gone during alarm delete");
            }
        }

        self.refresh_snapshot(user).await?;
        Ok(())
    }

    /// Attach an image to an alarm with a single unverified upload.
    pub async fn attach_image(&self, user: &UserId, id: Uuid, bytes: Bytes) -> AlarmResult<Alarm> {
        let alarm = self.get(user, id).await?;

        let path = format!(
            "users/{}/alarms/{}/{}.png",
            user.as_str(),
            alarm.id,
            Uuid::new_v4()
        );
        let metadata = BlobMetadata {
            user_id: user.as_str().to_string(),
            name: alarm.label.clone(),
            source_id: alarm.id,
            processed: false,
        };
        self.blobs.put(&path, bytes, "image/png", &metadata).await?;

        sqlx::query("UPDATE alarms SET image_path = ? WHERE id = ?")
            .bind(&path)
            .bind(id)
            .execute(&*self.db)
            .await?;

        self.refresh_snapshot(user).await?;
        self.get(user, id).await
    }

    /// Subscribe to full-snapshot updates of a user's alarms.
    pub fn subscribe(&self, user: &UserId) -> watch::Receiver<Vec<Alarm>> {
        self.snapshots.subscribe(user.as_str())
    }

    async fn fetch_all(&self, user: &UserId) -> Result<Vec<Alarm>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM alarms WHERE user_id = ? ORDER BY created_at DESC, id ASC"
        );
        sqlx::query_as::<_, Alarm>(&query)
            .bind(user.as_str())
            .fetch_all(&*self.db)
            .await
    }

    async fn refresh_snapshot(&self, user: &UserId) -> Result<(), sqlx::Error> {
        let current = self.fetch_all(user).await?;
        self.snapshots.publish(user.as_str(), current);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{blob_store::fakes::MemoryBlobStore, test_util};

    fn new_alarm(label: &str, time: &str) -> NewAlarm {
        NewAlarm {
            time: time.parse().unwrap(),
            label: label.to_string(),
            days: BTreeSet::from([Weekday::Monday, Weekday::Wednesday]),
            enabled: true,
        }
    }

    async fn store_with_blobs() -> (AlarmStore, Arc<MemoryBlobStore>) {
        let blobs = MemoryBlobStore::new();
        let store = AlarmStore::new(test_util::pool().await, blobs.clone());
        (store, blobs)
    }

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let (store, _blobs) = store_with_blobs().await;
        let user = UserId::new("u1");

        let alarm = store.create(&user, new_alarm("gym", "06:30")).await.unwrap();
        assert_eq!(alarm.time.to_string(), "06:30");
        assert_eq!(alarm.days_display(), "Mon, Wed");
        assert!(alarm.enabled);
        assert!(alarm.image_path.is_none());

        assert_eq!(store.list(&user).await.unwrap(), vec![alarm]);
    }

    #[tokio::test]
    async fn toggle_is_a_pure_partial_update() {
        let (store, _blobs) = store_with_blobs().await;
        let user = UserId::new("u1");

        let before = store.create(&user, new_alarm("gym", "06:30")).await.unwrap();
        let after = store.set_enabled(&user, before.id, false).await.unwrap();

        assert!(!after.enabled);
        assert_eq!(after.id, before.id);
        assert_eq!(after.time, before.time);
        assert_eq!(after.label, before.label);
        assert_eq!(after.days, before.days);
        assert_eq!(after.image_path, before.image_path);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn toggle_of_unknown_alarm_is_not_found() {
        let (store, _blobs) = store_with_blobs().await;
        assert!(matches!(
            store
                .set_enabled(&UserId::new("u1"), Uuid::new_v4(), true)
                .await,
            Err(AlarmStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn attach_image_uploads_once_and_records_path() {
        let (store, blobs) = store_with_blobs().await;
        let user = UserId::new("u1");

        let alarm = store.create(&user, new_alarm("gym", "06:30")).await.unwrap();
        let updated = store
            .attach_image(&user, alarm.id, Bytes::from_static(b"png"))
            .await
            .unwrap();

        let path = updated.image_path.expect("attachment path recorded");
        assert!(path.starts_with(&format!("users/u1/alarms/{}/", alarm.id)));
        assert!(blobs.contains(&path).await);
        assert_eq!(blobs.put_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_removes_alarm_and_attachment() {
        let (store, blobs) = store_with_blobs().await;
        let user = UserId::new("u1");

        let alarm = store.create(&user, new_alarm("gym", "06:30")).await.unwrap();
        let updated = store
            .attach_image(&user, alarm.id, Bytes::from_static(b"png"))
            .await
            .unwrap();
        let path = updated.image_path.unwrap();

        store.delete(&user, alarm.id).await.unwrap();

        assert!(store.list(&user).await.unwrap().is_empty());
        assert!(!blobs.contains(&path).await);
        assert!(matches!(
            store.delete(&user, alarm.id).await,
            Err(AlarmStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mutations_publish_full_snapshots() {
        let (store, _blobs) = store_with_blobs().await;
        let user = UserId::new("u1");
        let mut rx = store.subscribe(&user);

        let alarm = store.create(&user, new_alarm("gym", "06:30")).await.unwrap();
        rx.changed().await.expect("snapshot sender alive");
        assert_eq!(rx.borrow_and_update().as_slice(), &[alarm.clone()]);

        store.set_enabled(&user, alarm.id, false).await.unwrap();
        rx.changed().await.expect("snapshot sender alive");
        assert!(!rx.borrow_and_update()[0].enabled);

        store.delete(&user, alarm.id).await.unwrap();
        rx.changed().await.expect("snapshot sender alive");
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test]
    async fn users_only_see_their_own_alarms() {
        let (store, _blobs) = store_with_blobs().await;
        store
            .create(&UserId::new("u1"), new_alarm("gym", "06:30"))
            .await
            .unwrap();
        store
            .create(&UserId::new("u2"), new_alarm("work", "08:00"))
            .await
            .unwrap();

        let listed = store.list(&UserId::new("u2")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].label, "work");
    }
}
