//! Error types for local state.

use thiserror::Error;

/// Errors that can occur reading or writing local state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value failed validation before being persisted.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
