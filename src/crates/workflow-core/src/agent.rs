//! The `Agent` external interface contract (§6). Concrete LLM/provider
//! bindings are out of scope; this crate only consumes the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::AgentMessage;
use crate::error::WorkflowResult;

/// A reference to an out-of-scope tool invocation an agent made while
/// producing a response. Tool execution itself lives outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_id: String,
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// An agent's request to transfer control to a peer agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffSignal {
    pub target_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What `Agent::process` returns. A `handoff` present here marks this
/// response as a handoff signal rather than ordinary step output; the graph
/// executor detects it and runs the handoff procedure (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffSignal>,
}

impl Response {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new(), handoff: None }
    }

    pub fn handoff(target_agent: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            content: String::new(),
            tool_calls: Vec::new(),
            handoff: Some(HandoffSignal { target_agent: target_agent.into(), reason }),
        }
    }

    pub fn is_handoff(&self) -> bool {
        self.handoff.is_some()
    }
}

/// An external agent invoked by name from pipeline and graph steps.
/// Implementations own their own provider/model bindings; this crate only
/// calls `process` and interprets the result.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn process(&self, input: &str, history: &[AgentMessage]) -> WorkflowResult<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn process(&self, input: &str, _history: &[AgentMessage]) -> WorkflowResult<Response> {
            Ok(Response::text(format!("echo: {input}")))
        }
    }

    #[tokio::test]
    async fn agent_trait_is_object_safe_and_callable() {
        let agent: Box<dyn Agent> = Box::new(Echo);
        let response = agent.process("hi", &[]).await.unwrap();
        assert_eq!(response.content, "echo: hi");
        assert!(!response.is_handoff());
    }

    #[test]
    fn handoff_response_carries_no_content_requirement() {
        let response = Response::handoff("agent-b", Some("needs billing".into()));
        assert!(response.is_handoff());
        assert_eq!(response.handoff.unwrap().target_agent, "agent-b");
    }
}
