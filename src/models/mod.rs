//! Core data models for the scan catalog and alarm service.
//!
//! These entities map to database rows via `sqlx::FromRow` and serialize
//! naturally as JSON via `serde`.

pub mod alarm;
pub mod blob;
pub mod object;
