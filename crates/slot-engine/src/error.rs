//! Error types for slot-engine operations.

use thiserror::Error;

/// Errors raised while constructing or validating pure values.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Hydration error: {0}")]
    Hydration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of a failed call to an external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Transport failure; the request may or may not have reached the server.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response. The message is passed through as received.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The store refused the booking because the time is no longer free.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store rejected the payload.
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
