//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Schedule expression could not be parsed.
    #[error("invalid schedule expression '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    /// Schedule descriptor is out of range.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A task with this name is already registered.
    #[error("task already registered: {0}")]
    TaskExists(String),

    /// No task with this name is registered.
    #[error("task not found: {0}")]
    TaskNotFound(String),
}
