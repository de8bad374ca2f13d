//! Common error types for TuneMint

use thiserror::Error;

/// Common result type for TuneMint operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the store, the ledgers and the handlers
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored JSON file could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource already exists or is in a conflicting state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credit balance lower than the requested amount
    #[error("Insufficient credits: {available} available, {requested} requested")]
    InsufficientCredits { available: u64, requested: u64 },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
