//! # workflow-core
//!
//! Agent pipeline and graph workflow orchestration: sequential pipelines
//! with retries and pause/resume, DAG workflows with fork/join parallelism
//! and agent handoff chains, a typed lifecycle hook manager, and the
//! per-run context those executors accumulate into.
//!
//! Concrete LLM/provider bindings, tool execution, and checkpoint storage
//! backends are external collaborators consumed through the [`agent::Agent`]
//! and [`workflow_checkpoint::CheckpointStorage`] traits; this crate owns
//! only the orchestration.

pub mod agent;
pub mod context;
pub mod correlation;
pub mod error;
pub mod graph;
pub mod handoff;
pub mod hooks;
pub mod ids;
pub mod pipeline;
pub mod registry;
pub mod step;

pub use agent::{Agent, HandoffSignal, Response, ToolCall};
pub use context::{AgentMessage, ContextManager, MessageRole, PipelineContext, StepView};
pub use correlation::{CorrelationContext, SamplingPolicy};
pub use error::{WorkflowError, WorkflowResult};
pub use graph::{validate_graph, Edge, EdgeCondition, EdgeOp, GraphExecutor, GraphOutcome, GraphWorkflowConfig, MergeMode, Node};
pub use handoff::{run_handoff, HandoffTable};
pub use hooks::{HandlerToken, HookEvent, HookManager, HookOutcome, HookResult, HookType, MergedResult};
pub use ids::{NodeId, RunId, StepName, WorkflowId};
pub use pipeline::{ExecuteOptions, PipelineExecutor, PipelineOutcome};
pub use registry::{AgentRegistry, ConditionHandler, FunctionHandler, HandlerRegistry, PipelineRegistry};
pub use step::{PipelineConfig, RetryPolicy, Step};
