//! Domain errors for the canopy engine.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors raised by the task graph, router, and decomposition.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Duplicate task id: {0}")]
    DuplicateTaskId(Uuid),

    #[error("Parent task not found: {parent} (child {child})")]
    UnknownParent { child: Uuid, parent: Uuid },

    #[error("Dependency not found: {dependency} (task {task})")]
    UnknownDependency { task: Uuid, dependency: Uuid },

    #[error("Tree depth exceeded: task {task} would sit at depth {depth}, maximum is {max}")]
    DepthExceeded { task: Uuid, depth: usize, max: usize },

    #[error("Queue full: {limit} open tasks already admitted")]
    QueueFull { limit: usize },

    #[error("Invalid state transition from {from} to {to} for task {task}")]
    InvalidStateTransition { task: Uuid, from: String, to: String },

    #[error("No handler available for task {task} (requires: {requires})")]
    NoHandlerAvailable { task: Uuid, requires: String },

    #[error("Decomposition output could not be parsed: {reason}")]
    DecompositionParse { reason: String, raw: String },

    #[error("Decomposition failed: {0}")]
    DecompositionFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl DomainError {
    /// Structural violations rejected at graph insertion; the run keeps going.
    pub const fn is_insertion_rejection(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTaskId(_)
                | Self::UnknownParent { .. }
                | Self::UnknownDependency { .. }
                | Self::DepthExceeded { .. }
                | Self::QueueFull { .. }
        )
    }
}

/// Errors a handler may report instead of a [`TaskResult`](super::models::TaskResult).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transient handler failure: {0}")]
    Transient(String),

    #[error("Handler failed: {0}")]
    Fatal(String),

    #[error("Handler cancelled")]
    Cancelled,
}

impl HandlerError {
    /// Only transient failures are worth another attempt.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<DomainError> for HandlerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::DecompositionParse { .. } => Self::Transient(err.to_string()),
            other => Self::Fatal(other.to_string()),
        }
    }
}
