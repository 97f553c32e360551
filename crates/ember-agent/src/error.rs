//! Error types for the agent.

use thiserror::Error;

/// Errors that can occur in agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Completion service error.
    #[error("completion error: {0}")]
    Completion(#[from] ember_llm::CompletionError),

    /// Local state error.
    #[error("state error: {0}")]
    State(#[from] ember_state::StateError),

    /// Unknown task name.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// The pipeline ran but its critical stage did not succeed.
    #[error("{task} failed: {}", .errors.join("; "))]
    Pipeline { task: String, errors: Vec<String> },
}

/// Why a decision response was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    #[error("Empty response from completion service")]
    Empty,

    #[error("Invalid JSON in decision response: {0}")]
    InvalidJson(String),

    #[error("Decision must be a JSON object")]
    NotAnObject,

    #[error("Decision must contain a non-empty activities array")]
    NoActivities,

    #[error("Invalid activity type: {value}")]
    InvalidActivityType { index: usize, value: String },

    #[error("Invalid activity at index {index}: {reason}")]
    InvalidActivity { index: usize, reason: String },

    #[error("Invalid decision field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}
