//! Error taxonomy for the pipeline and graph executors.

use thiserror::Error;
use workflow_tooling::ErrorClass;

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("step {step} failed: {source}")]
    Execution { step: String, source: Box<WorkflowError> },

    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("hook dispatch machinery failed: {0}")]
    Hook(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("run was aborted by {aborted_by}")]
    Aborted { aborted_by: String },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] workflow_checkpoint::CheckpointError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Observability classification, per the error-handling design:
    /// `retryable` (timeouts/rate limits), `user` (validation), `provider`
    /// (auth/quota), `infrastructure` (storage/connection), `unknown`.
    pub fn class(&self) -> ErrorClass {
        match self {
            WorkflowError::Validation(_) => ErrorClass::User,
            WorkflowError::NotFound(_) | WorkflowError::AlreadyExists(_) => ErrorClass::User,
            WorkflowError::Provider(_) => ErrorClass::Provider,
            WorkflowError::Storage(_) | WorkflowError::Checkpoint(_) => ErrorClass::Infrastructure,
            WorkflowError::Concurrency(_) => ErrorClass::Retryable,
            WorkflowError::Execution { source, .. } => source.class(),
            WorkflowError::Routing(_) | WorkflowError::Hook(_) | WorkflowError::Aborted { .. } => {
                ErrorClass::Unknown
            }
            WorkflowError::Serialization(_) => ErrorClass::User,
        }
    }

    /// Whether a step loop should retry on this error, independent of the
    /// remaining attempt budget (a caller still has to check `attempt <
    /// maxRetries`). Mirrors the "retryable" class but callers that already
    /// know the error came from a user function may ignore this.
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Retryable | ErrorClass::Provider | ErrorClass::Infrastructure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_validation_as_user() {
        assert_eq!(WorkflowError::Validation("bad".into()).class(), ErrorClass::User);
    }

    #[test]
    fn execution_error_inherits_source_class() {
        let err = WorkflowError::Execution {
            step: "a".into(),
            source: Box::new(WorkflowError::Storage("disk full".into())),
        };
        assert_eq!(err.class(), ErrorClass::Infrastructure);
    }
}
