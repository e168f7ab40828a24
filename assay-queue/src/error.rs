use thiserror::Error;

use crate::types::JobStatus;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by the registry, the worker and the execution pipeline
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Job already registered: {0}")]
    DuplicateIdentifier(String),

    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("job has been interrupted: {0}")]
    Interrupted(String),

    #[error("error executing analysis: {message}; stderr: {stderr}")]
    ExecutionFailed { message: String, stderr: String },

    #[error("Failed to parse analysis result: {0}")]
    ParseFailed(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Callback delivery failed: {0}")]
    Callback(String),

    #[error("Snapshot is corrupt: {0}")]
    SnapshotCorrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::Io(format!("{}: {}", context, err))
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for QueueError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for QueueError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for QueueError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}
