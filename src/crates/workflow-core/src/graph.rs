//! Graph Workflow Executor: validation (§4.9) and execution (§4.4) of a DAG
//! of agent/function/conditional/pipeline-ref nodes plus fork/join control
//! nodes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{info_span, warn, Instrument};

use crate::context::{AgentMessage, ContextManager, PipelineContext, StepView};
use crate::error::{WorkflowError, WorkflowResult};
use crate::handoff::{run_handoff, HandoffTable};
use crate::hooks::{HookEvent, HookManager, HookType};
use crate::ids::{NodeId, RunId};
use crate::registry::{AgentRegistry, HandlerRegistry, PipelineRegistry};
use crate::step::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    ShallowMerge,
    Array,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOp {
    Equals,
    NotEquals,
    Gt,
    Lt,
    Exists,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EdgeCondition {
    /// Dot path into `outputs`, e.g. `"classify.label"`.
    pub field: String,
    pub op: EdgeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl EdgeCondition {
    fn evaluate(&self, outputs: &HashMap<String, Value>) -> bool {
        let actual = dot_path(outputs, &self.field);
        match self.op {
            EdgeOp::Exists => !matches!(actual, None | Some(Value::Null)),
            EdgeOp::Equals => actual == self.value.as_ref(),
            EdgeOp::NotEquals => actual != self.value.as_ref(),
            EdgeOp::Gt => numeric_compare(actual, self.value.as_ref(), |a, b| a > b),
            EdgeOp::Lt => numeric_compare(actual, self.value.as_ref(), |a, b| a < b),
        }
    }
}

fn dot_path<'a>(outputs: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let root = segments.next()?;
    let mut current = outputs.get(root)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn numeric_compare(actual: Option<&Value>, expected: Option<&Value>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), expected.and_then(Value::as_f64)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Agent {
        id: NodeId,
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
        #[serde(default)]
        view: StepView,
    },
    Function {
        id: NodeId,
        handler: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
        #[serde(default)]
        view: StepView,
    },
    Conditional {
        id: NodeId,
        condition: String,
        when_true: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when_false: Option<String>,
        #[serde(default)]
        view: StepView,
    },
    PipelineRef {
        id: NodeId,
        pipeline_id: String,
        #[serde(default)]
        view: StepView,
    },
    Fork {
        id: NodeId,
        branches: Vec<NodeId>,
    },
    Join {
        id: NodeId,
        sources: Vec<NodeId>,
        merge: MergeMode,
    },
}

impl Node {
    pub fn id(&self) -> &NodeId {
        match self {
            Node::Agent { id, .. }
            | Node::Function { id, .. }
            | Node::Conditional { id, .. }
            | Node::PipelineRef { id, .. }
            | Node::Fork { id, .. }
            | Node::Join { id, .. } => id,
        }
    }

    fn is_agent(&self) -> bool {
        matches!(self, Node::Agent { .. })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphWorkflowConfig {
    pub id: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub entry_node: NodeId,
    #[serde(default)]
    pub handoffs: HandoffTable,
    #[serde(default = "default_preserve_history")]
    pub preserve_handoff_history: bool,
}

fn default_preserve_history() -> bool {
    true
}

/// Graph validation per §4.9. Hard failures are returned as `Err`; rule 5
/// (handoff target not an agent node) is a warning only.
pub fn validate_graph(config: &GraphWorkflowConfig) -> WorkflowResult<()> {
    let mut ids = HashSet::new();
    for node in &config.nodes {
        if !ids.insert(node.id().clone()) {
            return Err(WorkflowError::Validation(format!("duplicate node id {}", node.id())));
        }
    }
    if !ids.contains(&config.entry_node) {
        return Err(WorkflowError::Validation(format!("entryNode {} is not a known node", config.entry_node)));
    }
    for edge in &config.edges {
        if !ids.contains(&edge.from) {
            return Err(WorkflowError::Validation(format!("edge references unknown source node {}", edge.from)));
        }
        if !ids.contains(&edge.to) {
            return Err(WorkflowError::Validation(format!("edge references unknown target node {}", edge.to)));
        }
    }
    for node in &config.nodes {
        match node {
            Node::Fork { branches, .. } => {
                for branch in branches {
                    if !ids.contains(branch) {
                        return Err(WorkflowError::Validation(format!("fork branch {branch} is not a known node")));
                    }
                }
            }
            Node::Join { sources, .. } => {
                for source in sources {
                    if !ids.contains(source) {
                        return Err(WorkflowError::Validation(format!("join source {source} is not a known node")));
                    }
                }
            }
            _ => {}
        }
    }

    detect_cycle(config)?;

    let mut outgoing: HashMap<&NodeId, Vec<&Edge>> = HashMap::new();
    for edge in &config.edges {
        outgoing.entry(&edge.from).or_default().push(edge);
    }
    for (node_id, edges) in &outgoing {
        if edges.len() >= 2 {
            let has_default_or_unconditional = edges.iter().any(|e| e.default || e.condition.is_none());
            if !has_default_or_unconditional {
                return Err(WorkflowError::Validation(format!(
                    "node {node_id} has {} outgoing edges but none is default or unconditional",
                    edges.len()
                )));
            }
        }
    }

    let agent_ids: HashSet<&NodeId> = config.nodes.iter().filter(|n| n.is_agent()).map(Node::id).collect();
    for target in config.handoffs.values().flatten() {
        if !agent_ids.iter().any(|id| id.as_str() == target) {
            warn!(target, "handoff target is not an agent node in this workflow");
        }
    }

    Ok(())
}

fn detect_cycle(config: &GraphWorkflowConfig) -> WorkflowResult<()> {
    let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for edge in &config.edges {
        adjacency.entry(&edge.from).or_default().push(&edge.to);
    }
    for node in &config.nodes {
        if let Node::Fork { id, branches } = node {
            adjacency.entry(id).or_default().extend(branches.iter());
        }
    }

    #[derive(PartialEq, Clone, Copy)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&NodeId, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a NodeId,
        adjacency: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
        marks: &mut HashMap<&'a NodeId, Mark>,
    ) -> WorkflowResult<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(WorkflowError::Validation(format!("cycle detected at node {node}"))),
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(next) = adjacency.get(node) {
            for n in next {
                visit(n, adjacency, marks)?;
            }
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for node in &config.nodes {
        visit(node.id(), &adjacency, &mut marks)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum GraphOutcome {
    Completed { run_id: RunId, context: PipelineContext, outputs: HashMap<String, Value>, executed_nodes: Vec<String> },
    Aborted { run_id: RunId, aborted_by: String },
    Failed { run_id: RunId, error: String },
}

pub struct GraphExecutor {
    pub hooks: Arc<HookManager>,
    pub agents: AgentRegistry,
    pub handlers: HandlerRegistry,
    pub pipelines: PipelineRegistry,
}

impl GraphExecutor {
    pub fn new(hooks: Arc<HookManager>, agents: AgentRegistry, handlers: HandlerRegistry, pipelines: PipelineRegistry) -> Self {
        Self { hooks, agents, handlers, pipelines }
    }

    pub async fn execute(&self, config: &GraphWorkflowConfig, input: &str, run_id: Option<RunId>) -> GraphOutcome {
        validate_graph(config).expect("graph must be validated at registration");
        let run_id = run_id.unwrap_or_else(RunId::generate);
        let span = info_span!("graph", workflow_id = %config.id, run_id = %run_id);

        async {
            match self.run(config, input, &run_id).await {
                Ok((context, executed_nodes)) => {
                    self.hooks
                        .execute(
                            HookType::AfterPipeline,
                            HookEvent {
                                hook_type: HookType::AfterPipeline,
                                data: Value::Null,
                                run_id: run_id.to_string(),
                                pipeline_id: Some(config.id.clone()),
                                step_name: None,
                            },
                        )
                        .await;
                    let outputs = context.outputs.clone();
                    GraphOutcome::Completed { run_id, context, outputs, executed_nodes }
                }
                Err(WorkflowError::Aborted { aborted_by }) => GraphOutcome::Aborted { run_id, aborted_by },
                Err(error) => {
                    self.hooks
                        .execute(
                            HookType::OnPipelineError,
                            HookEvent {
                                hook_type: HookType::OnPipelineError,
                                data: Value::from(error.to_string()),
                                run_id: run_id.to_string(),
                                pipeline_id: Some(config.id.clone()),
                                step_name: None,
                            },
                        )
                        .await;
                    GraphOutcome::Failed { run_id, error: error.to_string() }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        config: &GraphWorkflowConfig,
        input: &str,
        run_id: &RunId,
    ) -> WorkflowResult<(PipelineContext, Vec<String>)> {
        let nodes: HashMap<&NodeId, &Node> = config.nodes.iter().map(|n| (n.id(), n)).collect();
        let mut outgoing: HashMap<&NodeId, Vec<&Edge>> = HashMap::new();
        for edge in &config.edges {
            outgoing.entry(&edge.from).or_default().push(edge);
        }

        let context = ContextManager::new(PipelineContext::new(config.id.clone(), input));

        let before = self
            .hooks
            .execute_and_merge(
                HookType::BeforePipeline,
                HookEvent {
                    hook_type: HookType::BeforePipeline,
                    data: Value::Null,
                    run_id: run_id.to_string(),
                    pipeline_id: Some(config.id.clone()),
                    step_name: None,
                },
            )
            .await;
        if before.abort {
            return Err(WorkflowError::Aborted { aborted_by: before.aborted_by.unwrap_or_else(|| "beforePipeline".into()) });
        }

        let mut pending_joins: HashMap<&NodeId, HashSet<&NodeId>> = HashMap::new();
        for node in &config.nodes {
            if let Node::Join { id, sources, .. } = node {
                pending_joins.insert(id, sources.iter().collect());
            }
        }

        let mut enqueued: HashSet<&NodeId> = HashSet::new();
        let mut queue: VecDeque<&NodeId> = VecDeque::new();
        let entry = nodes
            .get(&config.entry_node)
            .ok_or_else(|| WorkflowError::Validation("entryNode missing from node set".into()))?
            .id();
        enqueued.insert(entry);
        queue.push_back(entry);

        let mut executed_nodes: Vec<String> = Vec::new();
        let mut ready_joins: Vec<&NodeId> = Vec::new();

        while let Some(node_id) = queue.pop_front().or_else(|| ready_joins.pop()) {
            let node = *nodes.get(node_id).expect("enqueued node must exist");

            match node {
                Node::Fork { branches, .. } => {
                    let branch_futures = branches.iter().map(|branch_id| {
                        let node = *nodes.get(branch_id).expect("fork branch must exist");
                        let view_snapshot = context.clone();
                        async move {
                            let forked = view_snapshot.get_full().await.fork();
                            let result = self.execute_node(node, &forked, run_id, config).await;
                            (branch_id, result)
                        }
                    });
                    let results = join_all(branch_futures).await;
                    for (branch_id, result) in results {
                        let value = result?;
                        context.record_output(branch_id.as_str(), value).await;
                        executed_nodes.push(branch_id.to_string());
                        enqueued.insert(branch_id);
                        self.mark_join_sources_complete(branch_id, &mut pending_joins, &mut ready_joins, &mut enqueued);
                        self.enqueue_next(branch_id, &outgoing, &context, &mut enqueued, &mut queue).await;
                    }
                }
                Node::Join { sources, merge, .. } => {
                    let full = context.get_full().await;
                    let merged = merge_join_outputs(&full.outputs, sources, *merge);
                    context.record_output(node_id.as_str(), merged).await;
                    executed_nodes.push(node_id.to_string());
                    self.enqueue_next(node_id, &outgoing, &context, &mut enqueued, &mut queue).await;
                }
                _ => {
                    let before_event = HookEvent {
                        hook_type: HookType::BeforeStep,
                        data: Value::Null,
                        run_id: run_id.to_string(),
                        pipeline_id: Some(config.id.clone()),
                        step_name: Some(node_id.to_string()),
                    };
                    let before_step = self.hooks.execute_and_merge(HookType::BeforeStep, before_event).await;
                    if before_step.abort {
                        return Err(WorkflowError::Aborted {
                            aborted_by: before_step.aborted_by.unwrap_or_else(|| "beforeStep".into()),
                        });
                    }
                    if before_step.skip {
                        executed_nodes.push(node_id.to_string());
                        self.enqueue_next(node_id, &outgoing, &context, &mut enqueued, &mut queue).await;
                        continue;
                    }

                    let full = context.get_full().await;
                    let value = self.execute_node(node, &full, run_id, config).await?;

                    context.record_output(node_id.as_str(), value.clone()).await;
                    executed_nodes.push(node_id.to_string());

                    let after_event = HookEvent {
                        hook_type: HookType::AfterStep,
                        data: value,
                        run_id: run_id.to_string(),
                        pipeline_id: Some(config.id.clone()),
                        step_name: Some(node_id.to_string()),
                    };
                    let after_step = self.hooks.execute_and_merge(HookType::AfterStep, after_event).await;
                    if !after_step.metadata.is_empty() {
                        context.merge_metadata(after_step.metadata).await;
                    }
                    if after_step.abort {
                        return Err(WorkflowError::Aborted {
                            aborted_by: after_step.aborted_by.unwrap_or_else(|| "afterStep".into()),
                        });
                    }

                    self.mark_join_sources_complete(node_id, &mut pending_joins, &mut ready_joins, &mut enqueued);
                    self.enqueue_next(node_id, &outgoing, &context, &mut enqueued, &mut queue).await;
                }
            }
        }

        Ok((context.get_full().await, executed_nodes))
    }

    fn mark_join_sources_complete<'a>(
        &self,
        completed: &'a NodeId,
        pending_joins: &mut HashMap<&'a NodeId, HashSet<&'a NodeId>>,
        ready_joins: &mut Vec<&'a NodeId>,
        enqueued: &mut HashSet<&'a NodeId>,
    ) {
        for (join_id, remaining) in pending_joins.iter_mut() {
            remaining.remove(completed);
            if remaining.is_empty() && enqueued.insert(join_id) {
                ready_joins.push(join_id);
            }
        }
    }

    async fn enqueue_next<'a>(
        &self,
        node_id: &'a NodeId,
        outgoing: &HashMap<&'a NodeId, Vec<&'a Edge>>,
        context: &ContextManager,
        enqueued: &mut HashSet<&'a NodeId>,
        queue: &mut VecDeque<&'a NodeId>,
    ) {
        let Some(edges) = outgoing.get(node_id) else { return };
        let outputs = context.get_full().await.outputs;

        let conditional: Vec<&&Edge> = edges.iter().filter(|e| e.condition.is_some()).collect();
        for edge in &conditional {
            let matched = edge.condition.as_ref().unwrap().evaluate(&outputs);
            if matched {
                if enqueued.insert(&edge.to) {
                    queue.push_back(&edge.to);
                }
                return;
            }
        }

        let defaults: Vec<&&Edge> = edges.iter().filter(|e| e.default).collect();
        if defaults.len() == 1 {
            if enqueued.insert(&defaults[0].to) {
                queue.push_back(&defaults[0].to);
            }
            return;
        }

        for edge in edges.iter().filter(|e| e.condition.is_none() && !e.default) {
            if enqueued.insert(&edge.to) {
                queue.push_back(&edge.to);
            }
        }
    }

    /// Runs the step-body semantics for a single executable node (§4.3,
    /// reused verbatim by the graph executor per §4.4) against a
    /// caller-supplied context snapshot. Agent nodes additionally detect
    /// handoff signals and drive the handoff procedure to completion.
    async fn execute_node(
        &self,
        node: &Node,
        view: &PipelineContext,
        run_id: &RunId,
        config: &GraphWorkflowConfig,
    ) -> WorkflowResult<Value> {
        match node {
            Node::Agent { agent_id, .. } => {
                let agent = self.agents.get(agent_id).await?;
                let response = agent.process(&view.input, &view.history).await?;
                if let Some(signal) = response.handoff.clone() {
                    let context = ContextManager::new(view.clone());
                    let mut chain = Vec::new();
                    let resolved = run_handoff(
                        &self.agents,
                        &config.handoffs,
                        &context,
                        agent_id,
                        signal,
                        config.preserve_handoff_history,
                        &mut chain,
                    )
                    .await;
                    return match resolved {
                        Ok(response) => Ok(serde_json::to_value(response)?),
                        Err(handoff_error) => Ok(handoff_error),
                    };
                }
                Ok(serde_json::to_value(response)?)
            }
            Node::Function { handler, .. } => {
                let function = self.handlers.get_function(handler).await?;
                function(view)
            }
            Node::Conditional { condition, when_true, when_false, .. } => {
                let predicate = self.handlers.get_condition(condition).await?;
                let taken = predicate(view)?;
                let branch_name = if taken { Some(when_true.clone()) } else { when_false.clone() };
                let branch_result = match &branch_name {
                    Some(name) => Some(self.handlers.get_function(name).await?(view)?),
                    None => None,
                };
                Ok(serde_json::json!({
                    "conditionResult": taken,
                    "result": branch_result,
                    "branchInfo": {
                        "takenPath": if taken { when_true.clone() } else { when_false.clone().unwrap_or_default() },
                        "notTakenPath": if taken { when_false.clone().unwrap_or_default() } else { when_true.clone() },
                    },
                }))
            }
            Node::PipelineRef { pipeline_id, .. } => {
                let pipeline = self.pipelines.get(pipeline_id).await?;
                let executor = crate::pipeline::PipelineExecutor::new(
                    self.hooks.clone(),
                    self.agents.clone(),
                    self.handlers.clone(),
                    self.pipelines.clone(),
                );
                let outcome = executor
                    .execute(&pipeline, &view.input, crate::pipeline::ExecuteOptions { run_id: Some(run_id.clone()), ..Default::default() })
                    .await;
                match outcome {
                    crate::pipeline::PipelineOutcome::Completed { final_output, .. } => Ok(final_output),
                    crate::pipeline::PipelineOutcome::Aborted { aborted_by, .. } => {
                        Err(WorkflowError::Aborted { aborted_by })
                    }
                    crate::pipeline::PipelineOutcome::Paused { .. } => {
                        Err(WorkflowError::Execution {
                            step: pipeline_id.clone(),
                            source: Box::new(WorkflowError::Validation("nested pipeline paused inside a graph node".into())),
                        })
                    }
                    crate::pipeline::PipelineOutcome::Failed { error, .. } => Err(WorkflowError::Execution {
                        step: pipeline_id.clone(),
                        source: Box::new(WorkflowError::Validation(error)),
                    }),
                }
            }
            Node::Fork { .. } | Node::Join { .. } => unreachable!("fork/join handled by caller"),
        }
    }
}

fn merge_join_outputs(outputs: &HashMap<String, Value>, sources: &[NodeId], merge: MergeMode) -> Value {
    let values: Vec<Value> = sources.iter().map(|id| outputs.get(id.as_str()).cloned().unwrap_or(Value::Null)).collect();
    match merge {
        MergeMode::Array => Value::Array(values),
        MergeMode::ShallowMerge => {
            let mut merged = serde_json::Map::new();
            for value in values {
                if let Value::Object(object) = value {
                    merged.extend(object);
                }
            }
            Value::Object(merged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::agent::{Agent, Response};
    use crate::registry::FunctionHandler;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn process(&self, input: &str, _history: &[AgentMessage]) -> WorkflowResult<Response> {
            Ok(Response::text(format!("echo: {input}")))
        }
    }

    fn function_node(id: &str, handler: &str) -> Node {
        Node::Function { id: NodeId::new(id).unwrap(), handler: handler.into(), retry: None, view: StepView::Accumulated }
    }

    fn always(value: Value) -> FunctionHandler {
        Arc::new(move |_ctx| Ok(value.clone()))
    }

    #[test]
    fn validation_rejects_duplicate_ids() {
        let config = GraphWorkflowConfig {
            id: "g1".into(),
            nodes: vec![function_node("a", "h"), function_node("a", "h")],
            edges: vec![],
            entry_node: NodeId::new("a").unwrap(),
            handoffs: HandoffTable::default(),
            preserve_handoff_history: true,
        };
        assert!(validate_graph(&config).is_err());
    }

    #[test]
    fn validation_rejects_cycles() {
        let config = GraphWorkflowConfig {
            id: "g1".into(),
            nodes: vec![function_node("a", "h"), function_node("b", "h")],
            edges: vec![
                Edge { from: NodeId::new("a").unwrap(), to: NodeId::new("b").unwrap(), condition: None, default: true },
                Edge { from: NodeId::new("b").unwrap(), to: NodeId::new("a").unwrap(), condition: None, default: true },
            ],
            entry_node: NodeId::new("a").unwrap(),
            handoffs: HandoffTable::default(),
            preserve_handoff_history: true,
        };
        assert!(validate_graph(&config).is_err());
    }

    #[test]
    fn validation_requires_default_edge_with_multiple_outgoing() {
        let config = GraphWorkflowConfig {
            id: "g1".into(),
            nodes: vec![function_node("a", "h"), function_node("b", "h"), function_node("c", "h")],
            edges: vec![
                Edge {
                    from: NodeId::new("a").unwrap(),
                    to: NodeId::new("b").unwrap(),
                    condition: Some(EdgeCondition { field: "a.x".into(), op: EdgeOp::Exists, value: None }),
                    default: false,
                },
                Edge {
                    from: NodeId::new("a").unwrap(),
                    to: NodeId::new("c").unwrap(),
                    condition: Some(EdgeCondition { field: "a.y".into(), op: EdgeOp::Exists, value: None }),
                    default: false,
                },
            ],
            entry_node: NodeId::new("a").unwrap(),
            handoffs: HandoffTable::default(),
            preserve_handoff_history: true,
        };
        assert!(validate_graph(&config).is_err());
    }

    #[tokio::test]
    async fn linear_graph_executes_in_order() {
        let hooks = Arc::new(HookManager::new());
        let agents = AgentRegistry::new();
        let handlers = HandlerRegistry::new();
        handlers.register_function("double", always(Value::from(2))).await;
        let executor = GraphExecutor::new(hooks, agents, handlers, PipelineRegistry::new());

        let config = GraphWorkflowConfig {
            id: "g1".into(),
            nodes: vec![function_node("a", "double"), function_node("b", "double")],
            edges: vec![Edge { from: NodeId::new("a").unwrap(), to: NodeId::new("b").unwrap(), condition: None, default: false }],
            entry_node: NodeId::new("a").unwrap(),
            handoffs: HandoffTable::default(),
            preserve_handoff_history: true,
        };

        let outcome = executor.execute(&config, "hi", None).await;
        match outcome {
            GraphOutcome::Completed { executed_nodes, .. } => assert_eq!(executed_nodes, vec!["a", "b"]),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fork_join_merges_branch_outputs() {
        let hooks = Arc::new(HookManager::new());
        let agents = AgentRegistry::new();
        let handlers = HandlerRegistry::new();
        handlers.register_function("left", always(serde_json::json!({"left": 1}))).await;
        handlers.register_function("right", always(serde_json::json!({"right": 2}))).await;
        let executor = GraphExecutor::new(hooks, agents, handlers, PipelineRegistry::new());

        let config = GraphWorkflowConfig {
            id: "g1".into(),
            nodes: vec![
                Node::Fork { id: NodeId::new("fork").unwrap(), branches: vec![NodeId::new("l").unwrap(), NodeId::new("r").unwrap()] },
                function_node("l", "left"),
                function_node("r", "right"),
                Node::Join {
                    id: NodeId::new("join").unwrap(),
                    sources: vec![NodeId::new("l").unwrap(), NodeId::new("r").unwrap()],
                    merge: MergeMode::ShallowMerge,
                },
            ],
            edges: vec![],
            entry_node: NodeId::new("fork").unwrap(),
            handoffs: HandoffTable::default(),
            preserve_handoff_history: true,
        };

        let outcome = executor.execute(&config, "hi", None).await;
        match outcome {
            GraphOutcome::Completed { outputs, .. } => {
                let joined = outputs.get("join").unwrap();
                assert_eq!(joined["left"], 1);
                assert_eq!(joined["right"], 2);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handoff_to_disallowed_target_yields_handoff_error_node_output() {
        let hooks = Arc::new(HookManager::new());
        let agents = AgentRegistry::new();
        agents.register("a", Arc::new(Echo)).await;

        struct Redirector;
        #[async_trait]
        impl Agent for Redirector {
            async fn process(&self, _input: &str, _history: &[AgentMessage]) -> WorkflowResult<Response> {
                Ok(Response::handoff("c", None))
            }
        }
        agents.register("a", Arc::new(Redirector)).await;

        let executor = GraphExecutor::new(hooks, agents, HandlerRegistry::new(), PipelineRegistry::new());
        let config = GraphWorkflowConfig {
            id: "g1".into(),
            nodes: vec![Node::Agent { id: NodeId::new("a_node").unwrap(), agent_id: "a".into(), retry: None, view: StepView::Accumulated }],
            edges: vec![],
            entry_node: NodeId::new("a_node").unwrap(),
            handoffs: HandoffTable::from([("a".to_string(), vec!["b".to_string()])]),
            preserve_handoff_history: true,
        };

        let outcome = executor.execute(&config, "hi", None).await;
        match outcome {
            GraphOutcome::Completed { outputs, .. } => {
                let result = outputs.get("a_node").unwrap();
                assert_eq!(result["type"], "handoff_error");
                assert_eq!(result["availableTargets"], serde_json::json!(["b"]));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }
}
