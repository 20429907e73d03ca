//! Caller identity.
//!
//! Authentication itself happens upstream (the gateway validates the session
//! and injects the resolved user id as a header). Handlers take a [`UserId`]
//! extractor, so below the HTTP boundary an unauthenticated call is
//! unrepresentable.

use crate::errors::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::fmt;

/// Header the upstream auth layer injects with the resolved user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(UserId::new)
            .ok_or_else(AppError::unauthenticated)
    }
}
