//! Pipeline context: per-step output accumulation and step-scoped views.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

/// A single turn of conversation history, appended by the executor or by
/// handoff logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl AgentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Which slice of the context a step/node body sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepView {
    /// Full context: all prior outputs, full history, full metadata.
    #[default]
    Accumulated,
    /// Input and metadata preserved; `outputs` and `history` start empty.
    Isolated,
}

/// The data a pipeline or graph run accumulates as it executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext {
    pub pipeline_id: String,
    pub input: String,
    pub outputs: HashMap<String, Value>,
    pub history: Vec<AgentMessage>,
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl PipelineContext {
    pub fn new(pipeline_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            input: input.into(),
            outputs: HashMap::new(),
            history: Vec::new(),
            metadata: HashMap::new(),
            conversation_id: None,
        }
    }

    /// Shallow clone for an independent fork branch: copies of outputs,
    /// history and metadata so a branch's mutations never interleave onto
    /// the pre-fork context.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// The view a step body actually sees for `view`.
    pub fn view(&self, view: StepView) -> PipelineContext {
        match view {
            StepView::Accumulated => self.clone(),
            StepView::Isolated => PipelineContext {
                pipeline_id: self.pipeline_id.clone(),
                input: self.input.clone(),
                outputs: HashMap::new(),
                history: Vec::new(),
                metadata: self.metadata.clone(),
                conversation_id: self.conversation_id.clone(),
            },
        }
    }
}

/// Narrow mutation API over a single [`PipelineContext`], safe for
/// single-threaded executor use. The graph executor clones the context for
/// each parallel fork branch rather than sharing a `ContextManager`.
#[derive(Clone)]
pub struct ContextManager {
    inner: Arc<RwLock<PipelineContext>>,
}

impl ContextManager {
    pub fn new(context: PipelineContext) -> Self {
        Self { inner: Arc::new(RwLock::new(context)) }
    }

    pub async fn get_step_context(&self, view: StepView) -> PipelineContext {
        self.inner.read().await.view(view)
    }

    pub async fn get_full(&self) -> PipelineContext {
        self.inner.read().await.clone()
    }

    /// Record a step's output. Recording twice for the same name is allowed
    /// (last write wins) but emits a warning, per the context invariants.
    pub async fn record_output(&self, name: &str, value: Value) {
        let mut ctx = self.inner.write().await;
        if ctx.outputs.contains_key(name) {
            warn!(step = name, "duplicate output recorded for step; last write wins");
        }
        ctx.outputs.insert(name.to_string(), value);
    }

    pub async fn append_history(&self, message: AgentMessage) {
        self.inner.write().await.history.push(message);
    }

    pub async fn add_metadata(&self, key: &str, value: Value) {
        self.inner.write().await.metadata.insert(key.to_string(), value);
    }

    pub async fn merge_metadata(&self, metadata: HashMap<String, Value>) {
        self.inner.write().await.metadata.extend(metadata);
    }

    pub async fn set_conversation_id(&self, conversation_id: String) {
        self.inner.write().await.conversation_id = Some(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn isolated_view_hides_outputs_and_history() {
        let mut ctx = PipelineContext::new("p", "hi");
        ctx.outputs.insert("a".into(), Value::from(1));
        ctx.history.push(AgentMessage::user("hello"));
        ctx.metadata.insert("k".into(), Value::from("v"));

        let isolated = ctx.view(StepView::Isolated);
        assert!(isolated.outputs.is_empty());
        assert!(isolated.history.is_empty());
        assert_eq!(isolated.metadata.get("k"), Some(&Value::from("v")));
        assert_eq!(isolated.input, "hi");
    }

    #[tokio::test]
    async fn accumulated_view_exposes_everything() {
        let mut ctx = PipelineContext::new("p", "hi");
        ctx.outputs.insert("a".into(), Value::from(1));
        let manager = ContextManager::new(ctx);

        let view = manager.get_step_context(StepView::Accumulated).await;
        assert_eq!(view.outputs.get("a"), Some(&Value::from(1)));
    }

    #[tokio::test]
    async fn duplicate_output_is_last_write_wins() {
        let manager = ContextManager::new(PipelineContext::new("p", "hi"));
        manager.record_output("a", Value::from(1)).await;
        manager.record_output("a", Value::from(2)).await;
        let full = manager.get_full().await;
        assert_eq!(full.outputs.get("a"), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn fork_is_independent_of_original() {
        let ctx = PipelineContext::new("p", "hi");
        let manager = ContextManager::new(ctx.clone());
        let forked = ctx.fork();
        manager.record_output("a", Value::from(1)).await;
        assert!(forked.outputs.is_empty());
    }
}
