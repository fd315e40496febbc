//! Read-mostly registries the executors resolve names against: agents (by
//! agent id), function/condition handlers (by name), and pipelines (for
//! `PipelineRef` steps/nodes).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::agent::Agent;
use crate::context::PipelineContext;
use crate::error::{WorkflowError, WorkflowResult};
use crate::step::PipelineConfig;

/// A registered function step body: takes the step's context view, returns
/// the value recorded as that step's output.
pub type FunctionHandler =
    Arc<dyn Fn(&PipelineContext) -> WorkflowResult<serde_json::Value> + Send + Sync>;

/// A registered conditional predicate: takes the step's context view,
/// returns which branch to take.
pub type ConditionHandler = Arc<dyn Fn(&PipelineContext) -> WorkflowResult<bool> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Arc<dyn Agent>>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, agent_id: impl Into<String>, agent: Arc<dyn Agent>) {
        self.agents.write().await.insert(agent_id.into(), agent);
    }

    pub async fn get(&self, agent_id: &str) -> WorkflowResult<Arc<dyn Agent>> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("agent {agent_id}")))
    }

    pub async fn contains(&self, agent_id: &str) -> bool {
        self.agents.read().await.contains_key(agent_id)
    }
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    functions: Arc<RwLock<HashMap<String, FunctionHandler>>>,
    conditions: Arc<RwLock<HashMap<String, ConditionHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_function(&self, name: impl Into<String>, handler: FunctionHandler) {
        self.functions.write().await.insert(name.into(), handler);
    }

    pub async fn register_condition(&self, name: impl Into<String>, handler: ConditionHandler) {
        self.conditions.write().await.insert(name.into(), handler);
    }

    pub async fn get_function(&self, name: &str) -> WorkflowResult<FunctionHandler> {
        self.functions
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("function handler {name}")))
    }

    pub async fn get_condition(&self, name: &str) -> WorkflowResult<ConditionHandler> {
        self.conditions
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("condition handler {name}")))
    }
}

#[derive(Clone, Default)]
pub struct PipelineRegistry {
    pipelines: Arc<RwLock<HashMap<String, Arc<PipelineConfig>>>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, pipeline: PipelineConfig) {
        self.pipelines.write().await.insert(pipeline.id.clone(), Arc::new(pipeline));
    }

    pub async fn get(&self, pipeline_id: &str) -> WorkflowResult<Arc<PipelineConfig>> {
        self.pipelines
            .read()
            .await
            .get(pipeline_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("pipeline {pipeline_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::agent::Response;
    use crate::context::AgentMessage;

    struct Noop;

    #[async_trait]
    impl Agent for Noop {
        async fn process(&self, _input: &str, _history: &[AgentMessage]) -> WorkflowResult<Response> {
            Ok(Response::text("noop"))
        }
    }

    #[tokio::test]
    async fn agent_registry_round_trips() {
        let registry = AgentRegistry::new();
        registry.register("a1", Arc::new(Noop)).await;
        assert!(registry.contains("a1").await);
        assert!(registry.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn pipeline_registry_not_found_is_named() {
        let registry = PipelineRegistry::new();
        let err = registry.get("ghost").await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
