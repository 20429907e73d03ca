//! HTTP handlers for alarm CRUD and attachments.

use crate::{
    auth::UserId,
    errors::AppError,
    models::alarm::Alarm,
    services::alarm_store::NewAlarm,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

/// Request body for `PATCH /alarms/{id}/enabled`.
#[derive(Debug, Deserialize)]
pub struct ToggleReq {
    pub enabled: bool,
}

/// POST `/alarms` — create an alarm.
pub async fn create_alarm(
    State(state): State<AppState>,
    user: UserId,
    Json(new): Json<NewAlarm>,
) -> Result<impl IntoResponse, AppError> {
    let alarm = state.alarms.create(&user, new).await?;
    Ok((StatusCode::CREATED, Json(alarm)))
}

/// GET `/alarms` — current alarms, most recently created first.
pub async fn list_alarms(
    State(state): State<AppState>,
    user: UserId,
) -> Result<Json<Vec<Alarm>>, AppError> {
    let alarms = state.alarms.list(&user).await?;
    Ok(Json(alarms))
}

/// PATCH `/alarms/{id}/enabled` — flip only the enabled flag.
pub async fn toggle_alarm(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<Uuid>,
    Json(toggle): Json<ToggleReq>,
) -> Result<Json<Alarm>, AppError> {
    let alarm = state.alarms.set_enabled(&user, id, toggle.enabled).await?;
    Ok(Json(alarm))
}

/// DELETE `/alarms/{id}` — remove the alarm and any attached image.
pub async fn delete_alarm(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.alarms.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/alarms/{id}/image` — attach an image with a single unverified
/// upload.
pub async fn attach_alarm_image(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Alarm>, AppError> {
    let alarm = state.alarms.attach_image(&user, id, body).await?;
    Ok(Json(alarm))
}
