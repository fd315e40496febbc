//! Routing-specific error taxonomy, distinct from [`workflow_core::WorkflowError`]
//! because `NoAgentsAvailable` has no analogue in the pipeline/graph executors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RoutingError>;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("no agents available to route to")]
    NoAgentsAvailable,

    #[error("invalid routing rule {id}: {reason}")]
    InvalidRule { id: String, reason: String },
}

impl From<RoutingError> for workflow_core::WorkflowError {
    fn from(value: RoutingError) -> Self {
        workflow_core::WorkflowError::Routing(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_workflow_error_routing_variant() {
        let wrapped: workflow_core::WorkflowError = RoutingError::NoAgentsAvailable.into();
        assert!(matches!(wrapped, workflow_core::WorkflowError::Routing(_)));
    }
}
