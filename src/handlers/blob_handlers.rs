//! Streaming blob downloads — the target of every minted download URL.

use crate::{errors::AppError, models::blob::BlobRecord, state::AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;

/// GET `/blobs/{*path}` — stream a blob payload with its stored headers.
pub async fn download_blob(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let (record, file) = state.disk.get_reader(&path).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_blob_headers(response.headers_mut(), &record);

    Ok(response)
}

fn set_blob_headers(headers: &mut HeaderMap, record: &BlobRecord) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&record.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    let quoted = format!("\"{}\"", record.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&record.created_at.to_rfc2822())
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
}
