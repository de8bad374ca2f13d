//! Shared API types and admin request authentication

pub mod auth;
pub mod types;

pub use auth::{calculate_hash, validate_hash, validate_timestamp, ApiAuthError};
pub use types::{AdminRequest, ErrorBody, ErrorResponse};
