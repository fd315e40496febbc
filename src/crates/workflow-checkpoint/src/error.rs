//! Error types for checkpoint storage and pause/resume operations.

use thiserror::Error;
use workflow_tooling::ErrorClass;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors raised by [`crate::storage::CheckpointStorage`] adapters and the
/// resume state machine in [`crate::pause`].
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the given run.
    #[error("checkpoint not found for run {run_id}")]
    NotFound { run_id: String },

    /// A run has no checkpoint saved with pause metadata to resume against.
    #[error("no pause found for run {run_id}")]
    PauseNotFound { run_id: String },

    /// The latest checkpoint for a run is paused but its TTL elapsed.
    #[error("pause for run {run_id} expired at {expired_at}")]
    PauseExpired { run_id: String, expired_at: String },

    /// A resume was attempted while another resume is already in flight, or
    /// the compare-and-swap on checkpoint status lost the race.
    #[error("concurrent resume in progress for run {run_id}")]
    Concurrency { run_id: String },

    /// Human-in-the-loop input failed schema or choice validation.
    #[error("invalid resume input: {0}")]
    Validation(String),

    /// The underlying storage adapter failed.
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    /// Context or metadata failed to serialize/deserialize.
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckpointError {
    /// Observability classification, matching `workflow_core::WorkflowError::class`
    /// so span status and log level stay consistent across crate boundaries.
    pub fn class(&self) -> ErrorClass {
        match self {
            CheckpointError::NotFound { .. } | CheckpointError::PauseNotFound { .. } => ErrorClass::User,
            CheckpointError::Validation(_) => ErrorClass::User,
            CheckpointError::PauseExpired { .. } | CheckpointError::Concurrency { .. } => ErrorClass::Retryable,
            CheckpointError::Storage(_) => ErrorClass::Infrastructure,
            CheckpointError::Serialization(_) => ErrorClass::User,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_expired_is_retryable() {
        assert_eq!(
            CheckpointError::PauseExpired { run_id: "r".into(), expired_at: "t".into() }.class(),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn not_found_is_user() {
        assert_eq!(CheckpointError::NotFound { run_id: "r".into() }.class(), ErrorClass::User);
    }
}
