//! Service layer: the blob store seam, the scan pipeline, the catalog and
//! alarm stores, and the background-removal client.

pub mod alarm_store;
pub mod blob_store;
pub mod catalog;
pub mod pipeline;
pub mod removal;
pub mod snapshots;

#[cfg(test)]
pub(crate) mod test_util {
    use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
    use std::sync::Arc;

    /// Fresh in-memory database with the schema applied.
    ///
    /// One connection only: each `sqlite::memory:` connection is its own
    /// database.
    pub async fn pool() -> Arc<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect to in-memory sqlite");

        let sql = include_str!("../../migrations/0001_init.sql");
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&pool).await.expect("apply schema");
        }

        Arc::new(pool)
    }
}
