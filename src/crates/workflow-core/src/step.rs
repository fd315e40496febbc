//! Pipeline step definitions and per-step retry policy.

use serde::{Deserialize, Serialize};

use crate::context::StepView;

/// Exponential backoff with a ceiling: `min(backoff_ms * 2^attempt, max_backoff_ms)`.
/// `max_backoff_ms` defaults to 10 seconds when unset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
}

const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let ceiling = self.max_backoff_ms.unwrap_or(DEFAULT_MAX_BACKOFF_MS);
        let scaled = self.backoff_ms.saturating_mul(1u64 << attempt.min(32));
        std::time::Duration::from_millis(scaled.min(ceiling))
    }
}

/// A step in a linear pipeline, per the tagged `Step` union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Agent {
        name: String,
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
        #[serde(default)]
        view: StepView,
    },
    Function {
        name: String,
        /// Name registered against the function step registry; the executor
        /// resolves this to a callable at run time.
        handler: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
        #[serde(default)]
        view: StepView,
    },
    Conditional {
        name: String,
        /// Name of a registered predicate over the current context.
        condition: String,
        when_true: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when_false: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
        #[serde(default)]
        view: StepView,
    },
    PipelineRef {
        name: String,
        pipeline_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
        #[serde(default)]
        view: StepView,
    },
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Agent { name, .. }
            | Step::Function { name, .. }
            | Step::Conditional { name, .. }
            | Step::PipelineRef { name, .. } => name,
        }
    }

    pub fn retry(&self) -> Option<RetryPolicy> {
        match self {
            Step::Agent { retry, .. }
            | Step::Function { retry, .. }
            | Step::Conditional { retry, .. }
            | Step::PipelineRef { retry, .. } => *retry,
        }
    }

    pub fn view(&self) -> StepView {
        match self {
            Step::Agent { view, .. }
            | Step::Function { view, .. }
            | Step::Conditional { view, .. }
            | Step::PipelineRef { view, .. } => *view,
        }
    }
}

/// A pipeline definition: an ordered list of steps executed sequentially,
/// short-circuiting on the first failure unless `fail_fast` is `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub id: String,
    pub steps: Vec<Step>,
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_every_step: Option<bool>,
}

fn default_fail_fast() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_ceiling() {
        let policy = RetryPolicy { max_retries: 5, backoff_ms: 100, max_backoff_ms: Some(1_000) };
        assert_eq!(policy.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(policy.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(policy.delay_for_attempt(2).as_millis(), 400);
        assert_eq!(policy.delay_for_attempt(10).as_millis(), 1_000);
    }

    #[test]
    fn backoff_defaults_ceiling_to_ten_seconds() {
        let policy = RetryPolicy { max_retries: 5, backoff_ms: 1_000, max_backoff_ms: None };
        assert_eq!(policy.delay_for_attempt(10).as_millis(), 10_000);
    }

    #[test]
    fn step_name_matches_variant_field() {
        let step = Step::Agent {
            name: "greet".into(),
            agent_id: "a1".into(),
            retry: None,
            view: StepView::Accumulated,
        };
        assert_eq!(step.name(), "greet");
    }
}
