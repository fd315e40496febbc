//! Agent handoff procedure (§4.5): an agent's response carrying a
//! [`HandoffSignal`] transfers control to a peer agent rather than
//! terminating the node's execution.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::agent::{Agent, HandoffSignal, Response};
use crate::context::{AgentMessage, ContextManager, StepView};
use crate::registry::AgentRegistry;

/// Which agent ids a source agent is permitted to hand off to, keyed by
/// source agent id. Carried on the graph workflow config.
pub type HandoffTable = HashMap<String, Vec<String>>;

fn is_allowed(table: &HandoffTable, source_agent: &str, target_agent: &str) -> bool {
    table
        .get(source_agent)
        .map(|targets| targets.iter().any(|t| t == target_agent))
        .unwrap_or(false)
}

/// Drive a handoff chain to completion, recursing with no depth limit while
/// the target itself returns another handoff signal. Returns the final
/// non-handoff response, or a tagged `handoff_error` value if a transfer is
/// rejected for referencing a disallowed target.
///
/// `chain` accumulates every agent id visited, starting with `source_agent`,
/// for observability (callers should log `chain.len()` for runaway
/// detection per the design notes — it is never capped).
pub async fn run_handoff(
    agents: &AgentRegistry,
    handoffs: &HandoffTable,
    context: &ContextManager,
    source_agent: &str,
    signal: HandoffSignal,
    preserve_history: bool,
    chain: &mut Vec<String>,
) -> Result<Response, Value> {
    if !is_allowed(handoffs, source_agent, &signal.target_agent) {
        let available = handoffs.get(source_agent).cloned().unwrap_or_default();
        return Err(json!({
            "type": "handoff_error",
            "error": format!("{source_agent} is not permitted to hand off to {}", signal.target_agent),
            "availableTargets": available,
        }));
    }

    chain.push(source_agent.to_string());

    let mut metadata_update = HashMap::new();
    metadata_update.insert("handoffFrom".to_string(), Value::from(source_agent));
    if let Some(reason) = &signal.reason {
        metadata_update.insert("handoffReason".to_string(), Value::from(reason.clone()));
    }
    metadata_update.insert("handoffChain".to_string(), json!(chain.clone()));
    context.merge_metadata(metadata_update).await;

    let target_agent = match agents.get(&signal.target_agent).await {
        Ok(agent) => agent,
        Err(e) => {
            return Err(json!({
                "type": "handoff_error",
                "error": e.to_string(),
                "availableTargets": handoffs.get(source_agent).cloned().unwrap_or_default(),
            }))
        }
    };

    let view = context.get_step_context(StepView::Accumulated).await;
    let history: Vec<AgentMessage> = if preserve_history { view.history.clone() } else { Vec::new() };

    let response = target_agent
        .process(&view.input, &history)
        .await
        .map_err(|e| json!({"type": "handoff_error", "error": e.to_string(), "availableTargets": []}))?;

    context.append_history(AgentMessage::assistant(response.content.clone())).await;

    if let Some(next_signal) = response.handoff.clone() {
        return Box::pin(run_handoff(
            agents,
            handoffs,
            context,
            &signal.target_agent,
            next_signal,
            preserve_history,
            chain,
        ))
        .await;
    }

    Ok(response)
}
