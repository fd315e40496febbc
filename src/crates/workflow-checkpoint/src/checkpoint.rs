//! Checkpoint and pause metadata structures.
//!
//! A checkpoint is the persisted boundary of a pipeline or graph run at a
//! given step: enough state to resume execution without re-running earlier
//! steps. `context` is a serialized snapshot of the engine's `PipelineContext`
//! — this crate treats it as opaque JSON so it has no dependency on
//! `workflow-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
    Expired,
}

impl CheckpointStatus {
    /// Whether `self -> next` is a legal transition per the checkpoint
    /// lifecycle (`pending -> in_progress -> {completed|failed|paused}`,
    /// `paused -> in_progress` on resume, `paused -> expired` on TTL lapse).
    pub fn can_transition_to(self, next: CheckpointStatus) -> bool {
        use CheckpointStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Paused)
                | (Paused, InProgress)
                | (Paused, Expired)
        )
    }
}

/// How a paused step should be treated when the run resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeBehavior {
    /// Advance past the paused step once human input is supplied.
    Continue,
    /// Re-execute the paused step with the human input appended to history.
    Rerun,
}

/// Metadata describing what is needed to resume a paused run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseMetadata {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    pub resume_behavior: ResumeBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl PauseMetadata {
    pub fn new(prompt: impl Into<String>, resume_behavior: ResumeBehavior) -> Self {
        Self {
            prompt: prompt.into(),
            choices: None,
            schema: None,
            resume_behavior,
            metadata: None,
        }
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A persisted execution-state boundary. `(run_id, step)` is the logical
/// primary key; `save` is an upsert on that pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub pipeline_id: String,
    pub step: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    pub status: CheckpointStatus,
    /// Serialized `PipelineContext` snapshot.
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_metadata: Option<PauseMetadata>,
}

impl Checkpoint {
    pub fn new(run_id: impl Into<String>, pipeline_id: impl Into<String>, step: u32, context: Value) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            pipeline_id: pipeline_id.into(),
            step,
            step_name: None,
            status: CheckpointStatus::Pending,
            context,
            created_at: now,
            updated_at: now,
            expires_at: None,
            pause_metadata: None,
        }
    }

    pub fn with_step_name(mut self, name: impl Into<String>) -> Self {
        self.step_name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: CheckpointStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_ttl(mut self, ttl_ms: i64) -> Self {
        self.expires_at = Some(self.created_at + chrono::Duration::milliseconds(ttl_ms));
        self
    }

    pub fn with_pause_metadata(mut self, pause: PauseMetadata) -> Self {
        self.pause_metadata = Some(pause);
        self.status = CheckpointStatus::Paused;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions() {
        use CheckpointStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Paused));
        assert!(Paused.can_transition_to(InProgress));
        assert!(Paused.can_transition_to(Expired));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn ttl_expiry() {
        let cp = Checkpoint::new("run-1", "pipe-1", 0, Value::Null).with_ttl(1000);
        assert!(!cp.is_expired(cp.created_at));
        assert!(cp.is_expired(cp.created_at + chrono::Duration::milliseconds(1001)));
    }

    #[test]
    fn pause_metadata_sets_status() {
        let cp = Checkpoint::new("run-1", "pipe-1", 2, Value::Null)
            .with_pause_metadata(PauseMetadata::new("choose", ResumeBehavior::Continue));
        assert_eq!(cp.status, CheckpointStatus::Paused);
    }
}
