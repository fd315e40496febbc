//! Sequential Pipeline Executor (§4.3).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info_span, warn, Instrument};
use workflow_checkpoint::{Checkpoint, CheckpointStatus, CheckpointStorage, PauseManager, PauseMetadata, ResumeMode};

use crate::agent::Agent;
use crate::context::{AgentMessage, ContextManager, PipelineContext, StepView};
use crate::error::{WorkflowError, WorkflowResult};
use crate::hooks::{HookEvent, HookManager, HookType};
use crate::ids::RunId;
use crate::registry::{AgentRegistry, HandlerRegistry, PipelineRegistry};
use crate::step::{PipelineConfig, Step};

/// A step body result that isn't ordinary output: the step is asking the
/// run to pause for external input (human-in-the-loop, long-running
/// external work, etc). Detected by the `type: "pause_request"` JSON
/// convention a `Function` handler may return.
fn detect_pause_signal(value: &Value) -> Option<PauseMetadata> {
    let object = value.as_object()?;
    if object.get("type")?.as_str()? != "pause_request" {
        return None;
    }
    serde_json::from_value(object.get("pauseMetadata")?.clone()).ok()
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub run_id: Option<RunId>,
    pub restored_context: Option<PipelineContext>,
    pub start_step: usize,
    pub ttl_ms: Option<i64>,
    pub checkpoint_every_step: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self { run_id: None, restored_context: None, start_step: 0, ttl_ms: None, checkpoint_every_step: false }
    }
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Completed { run_id: RunId, final_output: Value, context: PipelineContext },
    Paused { run_id: RunId, pause_request: PauseMetadata },
    Aborted { run_id: RunId, aborted_by: String },
    Failed { run_id: RunId, error: String },
}

pub struct PipelineExecutor {
    pub hooks: Arc<HookManager>,
    pub checkpoints: Option<Arc<dyn CheckpointStorage>>,
    pub agents: AgentRegistry,
    pub handlers: HandlerRegistry,
    pub pipelines: PipelineRegistry,
}

impl PipelineExecutor {
    pub fn new(hooks: Arc<HookManager>, agents: AgentRegistry, handlers: HandlerRegistry, pipelines: PipelineRegistry) -> Self {
        Self { hooks, checkpoints: None, agents, handlers, pipelines }
    }

    pub fn with_checkpoints(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.checkpoints = Some(storage);
        self
    }

    /// Resume a paused, failed, or completed run (§4.6): atomically claims
    /// the latest checkpoint via [`PauseManager`], rehydrates a
    /// [`PipelineContext`] from its opaque stored `context`, and re-enters
    /// [`Self::execute`] at the resulting step. Always reports the resumed
    /// checkpoint's terminal status back to storage, even on failure, so a
    /// crash mid-resume never leaves a run stuck `in_progress`.
    pub async fn resume(&self, config: &PipelineConfig, run_id: &str, mode: ResumeMode) -> WorkflowResult<PipelineOutcome> {
        self.resume_with(config, run_id, mode, None).await
    }

    /// Resume a human-in-the-loop pause (§4.6 "Human-in-the-loop resume"):
    /// validates `human_input` against the paused checkpoint's
    /// [`PauseMetadata`] (choices/shallow schema) before claiming the run,
    /// then appends it as a user turn in history.
    pub async fn resume_with_human_input(
        &self,
        config: &PipelineConfig,
        run_id: &str,
        human_input: Value,
        mode: ResumeMode,
    ) -> WorkflowResult<PipelineOutcome> {
        self.resume_with(config, run_id, mode, Some(human_input)).await
    }

    async fn resume_with(
        &self,
        config: &PipelineConfig,
        run_id: &str,
        mode: ResumeMode,
        human_input: Option<Value>,
    ) -> WorkflowResult<PipelineOutcome> {
        let storage = self
            .checkpoints
            .clone()
            .ok_or_else(|| WorkflowError::Validation("resume requires checkpoint storage".into()))?;

        if let Some(input) = &human_input {
            let latest = storage
                .get_latest(run_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("no checkpoint for run {run_id}")))?;
            if let Some(pause) = &latest.pause_metadata {
                PauseManager::validate_human_input(pause, input)?;
            }
        }

        let manager = PauseManager::new(storage);
        let handle = manager.begin_resume(run_id, mode).await?;

        let mut restored_context: PipelineContext = serde_json::from_value(handle.restored_context.clone())
            .map_err(|e| WorkflowError::Validation(format!("corrupt checkpoint context for run {run_id}: {e}")))?;
        if let Some(input) = human_input {
            let text = input.as_str().map(str::to_string).unwrap_or_else(|| input.to_string());
            restored_context.history.push(AgentMessage::user(text));
        }
        let input = restored_context.input.clone();
        let options = ExecuteOptions {
            run_id: Some(RunId::new(handle.run_id.clone())?),
            restored_context: Some(restored_context),
            start_step: handle.start_step as usize,
            ttl_ms: None,
            checkpoint_every_step: false,
        };

        let outcome = self.execute(config, &input, options).await;
        let success = matches!(outcome, PipelineOutcome::Completed { .. });
        if !matches!(outcome, PipelineOutcome::Paused { .. }) {
            manager.finish_resume(run_id, handle.start_step, success).await?;
        }
        Ok(outcome)
    }

    pub async fn execute(&self, config: &PipelineConfig, input: &str, options: ExecuteOptions) -> PipelineOutcome {
        let run_id = options.run_id.unwrap_or_else(RunId::generate);
        let span = info_span!("pipeline", pipeline_id = %config.id, run_id = %run_id);

        async {
            let context = match &options.restored_context {
                Some(restored) => {
                    let mut fresh = PipelineContext::new(config.id.clone(), input);
                    fresh.outputs = restored.outputs.clone();
                    fresh.metadata.extend(restored.metadata.clone());
                    fresh.history = restored.history.clone();
                    if fresh.conversation_id.is_none() {
                        fresh.conversation_id = restored.conversation_id.clone();
                    }
                    fresh
                }
                None => PipelineContext::new(config.id.clone(), input),
            };
            let context = ContextManager::new(context);

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
                return PipelineOutcome::Aborted {
                    run_id,
                    aborted_by: before.aborted_by.unwrap_or_else(|| "beforePipeline".into()),
                };
            }

            match self.run_steps(config, &context, &run_id, options.start_step, options.ttl_ms, options.checkpoint_every_step).await {
                Ok(Some(pause_request)) => PipelineOutcome::Paused { run_id, pause_request },
                Ok(None) => {
                    let full = context.get_full().await;
                    let final_output = config
                        .steps
                        .last()
                        .and_then(|step| full.outputs.get(step.name()).cloned())
                        .unwrap_or(Value::Null);

                    self.hooks
                        .execute(
                            HookType::AfterPipeline,
                            HookEvent {
                                hook_type: HookType::AfterPipeline,
                                data: final_output.clone(),
                                run_id: run_id.to_string(),
                                pipeline_id: Some(config.id.clone()),
                                step_name: None,
                            },
                        )
                        .await;

                    PipelineOutcome::Completed { run_id, final_output, context: full }
                }
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
                    PipelineOutcome::Failed { run_id, error: error.to_string() }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs `config.steps[start_step..]`. Returns `Ok(Some(pause))` if a
    /// step requested a pause, `Ok(None)` on full completion, `Err` on an
    /// uncaught step failure (all retries exhausted or an `abort` signal
    /// wrapped as an error by the caller's `PipelineOutcome::Aborted` path).
    async fn run_steps(
        &self,
        config: &PipelineConfig,
        context: &ContextManager,
        run_id: &RunId,
        start_step: usize,
        ttl_ms: Option<i64>,
        checkpoint_every_step: bool,
    ) -> WorkflowResult<Option<PauseMetadata>> {
        for (index, step) in config.steps.iter().enumerate().skip(start_step) {
            let step_event = HookEvent {
                hook_type: HookType::BeforeStep,
                data: Value::Null,
                run_id: run_id.to_string(),
                pipeline_id: Some(config.id.clone()),
                step_name: Some(step.name().to_string()),
            };
            let before_step = self.hooks.execute_and_merge(HookType::BeforeStep, step_event).await;
            if before_step.abort {
                return Err(WorkflowError::Aborted {
                    aborted_by: before_step.aborted_by.unwrap_or_else(|| "beforeStep".into()),
                });
            }
            if before_step.skip {
                continue;
            }

            let retry = step.retry();
            let max_attempts = retry.map(|r| r.max_retries + 1).unwrap_or(1);
            let mut attempt = 0;
            let step_result = loop {
                let result = self.run_step_body(step, context).await;
                match result {
                    Ok(outcome) => break Ok(outcome),
                    Err(error) => {
                        let error = WorkflowError::Execution { step: step.name().to_string(), source: Box::new(error) };
                        let error_event = HookEvent {
                            hook_type: HookType::OnStepError,
                            data: Value::from(error.to_string()),
                            run_id: run_id.to_string(),
                            pipeline_id: Some(config.id.clone()),
                            step_name: Some(step.name().to_string()),
                        };
                        let on_error = self.hooks.execute_and_merge(HookType::OnStepError, error_event).await;
                        if on_error.abort {
                            return Err(WorkflowError::Aborted {
                                aborted_by: on_error.aborted_by.unwrap_or_else(|| "onStepError".into()),
                            });
                        }
                        attempt += 1;
                        if attempt >= max_attempts {
                            break Err(error);
                        }
                        if let Some(policy) = retry {
                            tokio::time::sleep(policy.delay_for_attempt(attempt - 1)).await;
                        }
                    }
                }
            };

            let output = match step_result? {
                StepOutcome::Output(value) => value,
                StepOutcome::Pause(pause_metadata) => {
                    if let Some(storage) = &self.checkpoints {
                        let mut checkpoint = Checkpoint::new(
                            run_id.to_string(),
                            config.id.clone(),
                            index as u32,
                            context.get_full().await.into_value()?,
                        )
                        .with_step_name(step.name())
                        .with_pause_metadata(pause_metadata.clone());
                        if let Some(ttl) = ttl_ms {
                            checkpoint = checkpoint.with_ttl(ttl);
                        }
                        if let Err(e) = storage.save(checkpoint).await {
                            warn!(error = %e, "failed to save pause checkpoint");
                        }
                    }
                    return Ok(Some(pause_metadata));
                }
            };

            context.record_output(step.name(), output.clone()).await;

            let after_event = HookEvent {
                hook_type: HookType::AfterStep,
                data: output,
                run_id: run_id.to_string(),
                pipeline_id: Some(config.id.clone()),
                step_name: Some(step.name().to_string()),
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

            if checkpoint_every_step {
                if let Some(storage) = &self.checkpoints {
                    let checkpoint = Checkpoint::new(
                        run_id.to_string(),
                        config.id.clone(),
                        index as u32,
                        context.get_full().await.into_value()?,
                    )
                    .with_step_name(step.name())
                    .with_status(CheckpointStatus::InProgress);
                    if let Err(e) = storage.save(checkpoint).await {
                        warn!(error = %e, "failed to save in-progress checkpoint");
                    }
                }
            }
        }
        Ok(None)
    }

    async fn run_step_body(&self, step: &Step, context: &ContextManager) -> WorkflowResult<StepOutcome> {
        let view = context.get_step_context(step.view()).await;
        match step {
            Step::Agent { agent_id, .. } => {
                let agent = self.agents.get(agent_id).await?;
                let response = agent.process(&view.input, &view.history).await?;
                context.append_history(AgentMessage::assistant(response.content.clone())).await;
                Ok(StepOutcome::Output(serde_json::to_value(&response)?))
            }
            Step::Function { handler, .. } => {
                let function = self.handlers.get_function(handler).await?;
                let value = function(&view)?;
                if let Some(pause) = detect_pause_signal(&value) {
                    return Ok(StepOutcome::Pause(pause));
                }
                Ok(StepOutcome::Output(value))
            }
            Step::Conditional { condition, when_true, when_false, .. } => {
                let predicate = self.handlers.get_condition(condition).await?;
                let taken = predicate(&view)?;
                let branch_name = if taken { Some(when_true.clone()) } else { when_false.clone() };
                let branch_result = match &branch_name {
                    Some(name) => {
                        let function = self.handlers.get_function(name).await?;
                        Some(function(&view)?)
                    }
                    None => None,
                };
                Ok(StepOutcome::Output(serde_json::json!({
                    "conditionResult": taken,
                    "result": branch_result,
                    "branchInfo": {
                        "takenPath": if taken { when_true.clone() } else { when_false.clone().unwrap_or_default() },
                        "notTakenPath": if taken { when_false.clone().unwrap_or_default() } else { when_true.clone() },
                    },
                })))
            }
            Step::PipelineRef { pipeline_id, .. } => {
                let referenced = self.pipelines.get(pipeline_id).await?;
                let outcome = Box::pin(self.execute(&referenced, &view.input, ExecuteOptions::default())).await;
                match outcome {
                    PipelineOutcome::Completed { final_output, .. } => Ok(StepOutcome::Output(final_output)),
                    PipelineOutcome::Paused { pause_request, .. } => Ok(StepOutcome::Pause(pause_request)),
                    PipelineOutcome::Aborted { aborted_by, .. } => {
                        Err(WorkflowError::Aborted { aborted_by })
                    }
                    PipelineOutcome::Failed { error, .. } => Err(WorkflowError::Execution {
                        step: pipeline_id.clone(),
                        source: Box::new(WorkflowError::Validation(error)),
                    }),
                }
            }
        }
    }
}

enum StepOutcome {
    Output(Value),
    Pause(PauseMetadata),
}

trait IntoCheckpointValue {
    fn into_value(self) -> WorkflowResult<Value>;
}

impl IntoCheckpointValue for PipelineContext {
    fn into_value(self) -> WorkflowResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
