//! Error types for remote collaborators.

use thiserror::Error;

/// Errors from the memory store or deploy webhook.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Service answered with a non-success status.
    #[error("request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// Service is not configured.
    #[error("{0} is not configured")]
    Disabled(&'static str),
}
