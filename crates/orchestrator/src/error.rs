//! Error types for session orchestration

use thiserror::Error;
use threshold_types::{NodeId, SessionId};

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Errors that can occur while selecting, dispatching or awaiting a session
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Insufficient nodes available: {available} < {required}")]
    InsufficientNodes { available: usize, required: usize },

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    /// No result within the deadline; the remote ceremony may still complete
    #[error("Timeout waiting for result of session {0}, outcome unknown")]
    Timeout(SessionId),

    #[error("Session {0} cancelled by caller")]
    Cancelled(SessionId),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Result channel closed for session {0}")]
    ResultChannelClosed(SessionId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestrationError {
    /// Whether retrying with a fresh session may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestrationError::InsufficientNodes { .. }
                | OrchestrationError::DispatchFailed(_)
                | OrchestrationError::Timeout(_)
        )
    }
}

impl From<tokio::task::JoinError> for OrchestrationError {
    fn from(err: tokio::task::JoinError) -> Self {
        OrchestrationError::Internal(format!("Task join error: {}", err))
    }
}
