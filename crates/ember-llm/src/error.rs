//! Error types for the completion client.

use thiserror::Error;

/// Errors from a single transport call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered 429 Too Many Requests.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// The service answered with a non-success status.
    #[error("API error ({status}) {kind}: {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Whether this failure is throttling rather than an outright error.
    ///
    /// A 429 status always counts; otherwise the error kind and message are
    /// matched against the usual rate-limit phrasings.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            TransportError::RateLimited { .. } => true,
            TransportError::Api { status, .. } if *status == 429 => true,
            TransportError::Http(e) if e.status().map(|s| s.as_u16()) == Some(429) => true,
            other => {
                let text = other.to_string().to_lowercase();
                text.contains("rate limit")
                    || text.contains("rate_limit")
                    || text.contains("too many requests")
            }
        }
    }
}

/// Errors surfaced by [`crate::CompletionClient`] once retries are exhausted.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Every attempt failed; carries the last underlying cause.
    #[error("completion failed after {attempts} attempts{}: {source}", if *rate_limited { " (rate limited)" } else { "" })]
    Exhausted {
        attempts: u32,
        /// Whether the final failure was classified as a rate limit.
        rate_limited: bool,
        #[source]
        source: TransportError,
    },
}

impl CompletionError {
    /// Whether the final failure was throttling.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            CompletionError::Exhausted { rate_limited, .. } => *rate_limited,
        }
    }
}
