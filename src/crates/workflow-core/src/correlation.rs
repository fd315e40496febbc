//! Correlation context: the bundle of ids that tags every log, span, and
//! hook event belonging to a run.
//!
//! Per the async-local propagation design note, this is modeled two ways at
//! once: a [`tokio::task_local!`] for native async-local inheritance across
//! `.await` points within a single task tree, and an explicit
//! [`CorrelationContext`] value threaded through every [`crate::hooks::HookEvent`]
//! for handler code that can't rely on task-local inheritance (e.g. code
//! spawned onto a different task). Writing sets both; reading prefers the
//! task-local view and falls back to an explicit value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use workflow_tooling::serialization::generate_hash;

use crate::ids::RunId;

tokio::task_local! {
    static CURRENT: CorrelationContext;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationContext {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
}

impl CorrelationContext {
    pub fn new(run_id: &RunId) -> Self {
        Self {
            run_id: run_id.to_string(),
            conversation_id: None,
            intent_id: None,
            agent_id: None,
            timestamp: Utc::now(),
            trace_id: None,
            span_id: None,
            parent_span_id: None,
            pipeline_id: None,
            step_name: None,
        }
    }

    pub fn with_pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    pub fn with_step(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    /// Run an async scope with this context installed as the task-local
    /// current value (the `WithCorrelation(ctx, fn)` pattern from the design
    /// notes).
    pub async fn scope<F, T>(self, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        CURRENT.scope(self, fut).await
    }

    /// Read the task-local current context, if inside a `scope`.
    pub fn try_current() -> Option<CorrelationContext> {
        CURRENT.try_with(|c| c.clone()).ok()
    }

    /// Read the task-local current context, falling back to an explicit
    /// value supplied by the caller when task-local inheritance isn't
    /// available (e.g. inside a hook handler spawned on another task).
    pub fn current_or(fallback: &CorrelationContext) -> CorrelationContext {
        Self::try_current().unwrap_or_else(|| fallback.clone())
    }
}

/// Sampling decision policy, per §4.8: errors and slow runs are always
/// sampled, debug mode samples everything, otherwise sampling is a
/// deterministic hash of `run_id` against the configured success rate so the
/// same run always samples the same way.
#[derive(Debug, Clone, Copy)]
pub struct SamplingPolicy {
    pub success_sample_rate: f64,
    pub slow_threshold_ms: u64,
    pub debug_mode: bool,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            success_sample_rate: 0.1,
            slow_threshold_ms: 5000,
            debug_mode: false,
        }
    }
}

impl SamplingPolicy {
    pub fn should_sample(&self, run_id: &RunId, is_error: bool, duration_ms: u64) -> bool {
        if is_error || duration_ms >= self.slow_threshold_ms || self.debug_mode {
            return true;
        }
        let bucket = (generate_hash(&run_id.as_str()) % 10_000) as f64 / 10_000.0;
        bucket < self.success_sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_installs_task_local_context() {
        let run_id = RunId::generate();
        let ctx = CorrelationContext::new(&run_id);
        let seen = ctx
            .clone()
            .scope(async { CorrelationContext::try_current().map(|c| c.run_id) })
            .await;
        assert_eq!(seen, Some(run_id.to_string()));
    }

    #[test]
    fn errors_and_slow_runs_always_sample() {
        let policy = SamplingPolicy { success_sample_rate: 0.0, ..Default::default() };
        let run_id = RunId::generate();
        assert!(policy.should_sample(&run_id, true, 0));
        assert!(policy.should_sample(&run_id, false, 6000));
        assert!(!policy.should_sample(&run_id, false, 0));
    }

    #[test]
    fn debug_mode_samples_everything() {
        let policy = SamplingPolicy { success_sample_rate: 0.0, debug_mode: true, ..Default::default() };
        assert!(policy.should_sample(&RunId::generate(), false, 0));
    }

    #[test]
    fn sampling_is_deterministic_for_a_run_id() {
        let policy = SamplingPolicy { success_sample_rate: 0.5, ..Default::default() };
        let run_id = RunId::generate();
        let first = policy.should_sample(&run_id, false, 0);
        let second = policy.should_sample(&run_id, false, 0);
        assert_eq!(first, second);
    }
}
