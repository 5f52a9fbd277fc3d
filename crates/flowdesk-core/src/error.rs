use thiserror::Error;

/// Core error type for the Flowdesk workflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed input the caller can fix (empty step set, duplicate
    /// step ids, dangling `next_steps` references). Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown workflow, template, target step, or assignee
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation rejected by a lifecycle precondition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Optimistic concurrency check failed; the caller should re-read
    /// and resubmit
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Record store failure, propagated unmodified
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
