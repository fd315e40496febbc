//! Ambient stack shared by every workflow-engine crate: error
//! classification for observability, log redaction, and stable hashing for
//! deterministic sampling.
//!
//! # Modules
//!
//! - `logging` - redaction of secrets from log lines before they reach `tracing`
//! - `serialization` - stable hashing for deterministic run-id sampling

pub mod logging;
pub mod serialization;

use serde::{Deserialize, Serialize};

/// Coarse classification of an error for observability purposes, per the
/// error-handling design: drives span status (`user` -> ok, else -> error)
/// and log level (`user`/`retryable` -> warn, else -> error). Every crate's
/// own error enum (`WorkflowError`, `CheckpointError`, `RoutingError`) maps
/// into this so the executors can treat them uniformly regardless of which
/// layer raised the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient failure worth retrying (timeouts, rate limits).
    Retryable,
    /// Caller-supplied input was invalid.
    User,
    /// An upstream provider rejected the call (auth, quota).
    Provider,
    /// Storage/connection/environment failure.
    Infrastructure,
    /// Unclassified.
    Unknown,
}

impl ErrorClass {
    /// Span status the observability glue should record for this class.
    pub fn is_span_ok(self) -> bool {
        matches!(self, ErrorClass::User)
    }

    /// `tracing` level name this class should log at.
    pub fn log_level(self) -> &'static str {
        match self {
            ErrorClass::User | ErrorClass::Retryable => "warn",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_class_drives_span_status() {
        assert!(ErrorClass::User.is_span_ok());
        assert!(!ErrorClass::Infrastructure.is_span_ok());
        assert!(!ErrorClass::Provider.is_span_ok());
    }

    #[test]
    fn error_class_drives_log_level() {
        assert_eq!(ErrorClass::User.log_level(), "warn");
        assert_eq!(ErrorClass::Retryable.log_level(), "warn");
        assert_eq!(ErrorClass::Unknown.log_level(), "error");
    }
}
