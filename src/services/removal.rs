//! Client for the external background-removal API.
//!
//! The API takes an inline base64 image and returns the background-stripped
//! image bytes on HTTP 200, or a JSON error body otherwise. Calls are never
//! retried — a vendor rejection is final for the request that triggered it.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP request timeout for a single removal call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum RemovalError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("removal request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("removal service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

/// Strips the background from an image.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove(&self, image: &[u8]) -> Result<Vec<u8>, RemovalError>;
}

/// Wire form of a removal request.
#[derive(Debug, Serialize)]
pub struct RemovalRequest {
    /// Base64-encoded source image.
    pub image_file_b64: String,
    pub size: &'static str,
    pub format: &'static str,
    #[serde(rename = "type")]
    pub subject_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
}

impl RemovalRequest {
    pub fn new(image: &[u8]) -> Self {
        Self {
            image_file_b64: general_purpose::STANDARD.encode(image),
            size: "auto",
            format: "png",
            subject_type: "auto",
            bg_color: None,
        }
    }
}

/// Error body shape the service returns on non-success statuses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    title: String,
}

/// HTTP client for the removal service.
pub struct RemovalApi {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RemovalApi {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Turn a non-success response body into a readable message.
    fn error_message(status: u16, body: &str) -> String {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) if !parsed.errors.is_empty() => parsed
                .errors
                .into_iter()
                .map(|e| e.title)
                .collect::<Vec<_>>()
                .join("; "),
            _ if !body.trim().is_empty() => body.trim().to_string(),
            _ => format!("HTTP {status} with empty body"),
        }
    }
}

#[async_trait]
impl BackgroundRemover for RemovalApi {
    async fn remove(&self, image: &[u8]) -> Result<Vec<u8>, RemovalError> {
        let request = RemovalRequest::new(image);
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = Self::error_message(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), %message, "removal service rejected image");
            return Err(RemovalError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_does_not_panic() {
        let _api = RemovalApi::new("https://example.test/remove", "key");
    }

    #[test]
    fn request_encodes_image_as_base64() {
        let request = RemovalRequest::new(b"image-bytes");
        let decoded = general_purpose::STANDARD
            .decode(&request.image_file_b64)
            .unwrap();
        assert_eq!(decoded, b"image-bytes");
        assert_eq!(request.size, "auto");
        assert_eq!(request.format, "png");
    }

    #[test]
    fn request_serializes_type_field_name() {
        let json = serde_json::to_string(&RemovalRequest::new(b"x")).unwrap();
        assert!(json.contains("\"type\":\"auto\""));
        assert!(!json.contains("bg_color"));
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let body = r#"{"errors":[{"title":"Insufficient credits"}]}"#;
        assert_eq!(RemovalApi::error_message(402, body), "Insufficient credits");
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(RemovalApi::error_message(500, "boom"), "boom");
        assert_eq!(
            RemovalApi::error_message(500, "  "),
            "HTTP 500 with empty body"
        );
    }

    #[test]
    fn api_error_display() {
        let err = RemovalError::Api {
            status: 402,
            message: "Insufficient credits".into(),
        };
        assert_eq!(
            err.to_string(),
            "removal service returned HTTP 402: Insufficient credits"
        );
    }
}
