//! Shared API request/response types

use serde::{Deserialize, Serialize};

/// Signed admin request body
///
/// Admin endpoints accept arbitrary extra fields next to these two; the
/// hash covers the whole body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminRequest {
    /// Unix epoch time in milliseconds
    pub timestamp: i64,

    /// SHA-256 hash (64 hex chars)
    pub hash: String,
}

/// JSON error body returned by every failing handler
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `INSUFFICIENT_CREDITS`
    pub code: String,
    pub message: String,
}
