use crate::services::{
    alarm_store::AlarmStoreError, blob_store::BlobStoreError, catalog::CatalogError,
    pipeline::PipelineError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for handler errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 401 when no caller identity is present.
    pub fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "no authenticated identity")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<BlobStoreError> for AppError {
    fn from(err: BlobStoreError) -> Self {
        let status = match &err {
            BlobStoreError::NotFound(_) => StatusCode::NOT_FOUND,
            BlobStoreError::InvalidPath => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => AppError::new(StatusCode::NOT_FOUND, err.to_string()),
            CatalogError::Store(store) => store.into(),
            CatalogError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<AlarmStoreError> for AppError {
    fn from(err: AlarmStoreError) -> Self {
        match err {
            AlarmStoreError::NotFound(_) => AppError::new(StatusCode::NOT_FOUND, err.to_string()),
            AlarmStoreError::Store(store) => store.into(),
            AlarmStoreError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidImage(_) => {
                AppError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            PipelineError::RemovalService(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, err.to_string())
            }
            PipelineError::UploadFailed { .. } => AppError::internal(err.to_string()),
            PipelineError::Catalog(catalog) => catalog.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn not_found_maps_to_404() {
        let err: AppError = CatalogError::NotFound(Uuid::new_v4()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_path_maps_to_400() {
        let err: AppError = BlobStoreError::InvalidPath.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn removal_failure_maps_to_502() {
        let err: AppError = PipelineError::RemovalService(
            crate::services::removal::RemovalError::Api {
                status: 402,
                message: "insufficient credits".into(),
            },
        )
        .into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn upload_failure_maps_to_500() {
        let err: AppError = PipelineError::UploadFailed {
            path: "users/u1/objects/a.png".into(),
            attempts: 3,
        }
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unauthenticated_is_401() {
        assert_eq!(AppError::unauthenticated().status, StatusCode::UNAUTHORIZED);
    }
}
