//! Error types for tunemint-server
//!
//! Every handler returns [`ApiResult`]; failures render as
//! `{"error": {"code": ..., "message": ...}}` with a matching status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Not enough credits for the operation (400)
    #[error("Insufficient credits: {available} available, {requested} requested")]
    InsufficientCredits { available: u64, requested: u64 },

    /// Missing or invalid admin signature (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller does not own the resource (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409) - duplicate registration, already sold, ...
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Fixed-window limit exhausted (429)
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A third-party service failed (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A required integration is not configured (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::InsufficientCredits { .. } => (StatusCode::BAD_REQUEST, "INSUFFICIENT_CREDITS"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<tunemint_common::Error> for ApiError {
    fn from(err: tunemint_common::Error) -> Self {
        use tunemint_common::Error as E;
        match err {
            E::NotFound(msg) => ApiError::NotFound(msg),
            E::InvalidInput(msg) => ApiError::BadRequest(msg),
            E::Conflict(msg) => ApiError::Conflict(msg),
            E::InsufficientCredits { available, requested } => {
                ApiError::InsufficientCredits { available, requested }
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code, "{}", self);
        }

        let mut body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });
        if let ApiError::RateLimited { retry_after_secs } = &self {
            body["error"]["retry_after_secs"] = json!(retry_after_secs);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
