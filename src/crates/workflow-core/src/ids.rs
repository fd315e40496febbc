//! Opaque workflow identifiers.
//!
//! `WorkflowId`, `RunId`, `StepName`, and `NodeId` are all constrained to
//! `[A-Za-z0-9._-]` with length at most 256; this is enforced once here
//! rather than re-validated ad hoc at every call site.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

const MAX_ID_LEN: usize = 256;

fn validate(kind: &'static str, value: &str) -> WorkflowResult<()> {
    if value.is_empty() || value.len() > MAX_ID_LEN {
        return Err(WorkflowError::Validation(format!(
            "{kind} must be 1..={MAX_ID_LEN} characters, got {} ({value:?})",
            value.len()
        )));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
        return Err(WorkflowError::Validation(format!(
            "{kind} {value:?} must match [A-Za-z0-9._-]"
        )));
    }
    Ok(())
}

macro_rules! opaque_id {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> WorkflowResult<Self> {
                let value = value.into();
                validate($label, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = WorkflowError;
            fn try_from(value: String) -> WorkflowResult<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = WorkflowError;
            fn try_from(value: &str) -> WorkflowResult<Self> {
                Self::new(value.to_string())
            }
        }
    };
}

opaque_id!(WorkflowId, "WorkflowId");
opaque_id!(StepName, "StepName");
opaque_id!(NodeId, "NodeId");

/// Identifier for a single top-level execution. A fresh UUID unless the
/// caller supplies one for deterministic resume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(value: impl Into<String>) -> WorkflowResult<Self> {
        let value = value.into();
        validate("RunId", &value)?;
        Ok(Self(value))
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_characters() {
        assert!(StepName::new("has space").is_err());
        assert!(StepName::new("has/slash").is_err());
        assert!(StepName::new("ok-name_1.2").is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(StepName::new("").is_err());
        assert!(StepName::new("a".repeat(257)).is_err());
        assert!(StepName::new("a".repeat(256)).is_ok());
    }

    #[test]
    fn run_id_generates_uuid() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
    }
}
