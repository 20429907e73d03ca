//! HTTP handlers for scanned objects.
//!
//! The heavy lifting happens in `ScanPipeline` and `ObjectCatalog`; these
//! handlers only extract the caller identity and translate errors.

use crate::{auth::UserId, errors::AppError, models::object::ScannedObject, state::AppState};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

/// Query params accepted by `POST /objects`.
#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    /// User-supplied label for the photographed object.
    pub name: String,
}

/// POST `/objects?name=...` — run the scan pipeline on the request body.
pub async fn scan_object(
    State(state): State<AppState>,
    user: UserId,
    Query(query): Query<ScanQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.pipeline.scan(&user, &query.name, &body).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET `/objects` — current objects, most recent first. Entries whose blob
/// has gone missing are pruned as a side effect of this read.
pub async fn list_objects(
    State(state): State<AppState>,
    user: UserId,
) -> Result<Json<Vec<ScannedObject>>, AppError> {
    let objects = state.catalog.list(&user).await?;
    Ok(Json(objects))
}

/// DELETE `/objects/{id}` — remove the catalog entry and its blob.
pub async fn delete_object(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
