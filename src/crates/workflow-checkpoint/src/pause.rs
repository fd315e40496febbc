//! Resume state machine: concurrency-guarded resume and human-in-the-loop
//! input validation.
//!
//! The actual step/node re-execution loop lives in `workflow-core`; this
//! module owns everything that must happen atomically around it — loading
//! the checkpoint, the compare-and-swap into `in_progress`, and the final
//! `completed`/`failed` transition — so two concurrent callers can never both
//! believe they own the same run.

use std::sync::Arc;

use serde_json::Value;

use crate::checkpoint::{Checkpoint, CheckpointStatus, PauseMetadata, ResumeBehavior};
use crate::error::{CheckpointError, Result};
use crate::traits::CheckpointStorage;

/// How a completed/failed/paused run should be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Start at `checkpoint.step + 1` (default).
    Skip,
    /// Start at `checkpoint.step`, re-executing that step.
    Retry,
    /// Start at step 0 with the restored context.
    Restart,
}

impl Default for ResumeMode {
    fn default() -> Self {
        ResumeMode::Skip
    }
}

/// Everything the executor needs to continue a run: which step to resume
/// from and the context snapshot to rehydrate into its `ContextManager`.
#[derive(Debug, Clone)]
pub struct ResumeHandle {
    pub run_id: String,
    pub pipeline_id: String,
    pub start_step: u32,
    pub restored_context: Value,
}

/// Coordinates resume against a [`CheckpointStorage`] adapter.
pub struct PauseManager {
    storage: Arc<dyn CheckpointStorage>,
}

impl PauseManager {
    pub fn new(storage: Arc<dyn CheckpointStorage>) -> Self {
        Self { storage }
    }

    /// Load the latest checkpoint, atomically claim it for resume, and
    /// return the point to resume execution from.
    ///
    /// Fails with [`CheckpointError::PauseNotFound`] if no checkpoint exists,
    /// [`CheckpointError::PauseExpired`] if the latest checkpoint is paused
    /// past its TTL, and [`CheckpointError::Concurrency`] if another resume
    /// already claimed the run.
    pub async fn begin_resume(&self, run_id: &str, mode: ResumeMode) -> Result<ResumeHandle> {
        let checkpoint = self
            .storage
            .get_latest(run_id)
            .await?
            .ok_or_else(|| CheckpointError::PauseNotFound { run_id: run_id.to_string() })?;

        if checkpoint.status == CheckpointStatus::Paused && checkpoint.is_expired(chrono::Utc::now()) {
            self.storage
                .update_status(run_id, checkpoint.step, CheckpointStatus::Expired)
                .await?;
            return Err(CheckpointError::PauseExpired {
                run_id: run_id.to_string(),
                expired_at: checkpoint
                    .expires_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            });
        }

        if checkpoint.status == CheckpointStatus::InProgress {
            return Err(CheckpointError::Concurrency { run_id: run_id.to_string() });
        }

        let claimed = self
            .storage
            .compare_and_swap_status(run_id, checkpoint.step, checkpoint.status, CheckpointStatus::InProgress)
            .await?;
        if !claimed {
            return Err(CheckpointError::Concurrency { run_id: run_id.to_string() });
        }

        let start_step = match mode {
            ResumeMode::Skip => checkpoint.step + 1,
            ResumeMode::Retry => checkpoint.step,
            ResumeMode::Restart => 0,
        };

        let restored_context = if mode == ResumeMode::Restart {
            checkpoint.context.clone()
        } else {
            checkpoint.context.clone()
        };

        Ok(ResumeHandle {
            run_id: run_id.to_string(),
            pipeline_id: checkpoint.pipeline_id.clone(),
            start_step,
            restored_context,
        })
    }

    /// Mark the run's resumed checkpoint as `completed` or `failed`. Must be
    /// called even if the failure originated deep inside the executor, so
    /// the run never gets stuck `in_progress`.
    pub async fn finish_resume(&self, run_id: &str, step: u32, success: bool) -> Result<()> {
        let status = if success { CheckpointStatus::Completed } else { CheckpointStatus::Failed };
        self.storage.update_status(run_id, step, status).await
    }

    /// Validate human-supplied resume input against a pause's metadata.
    ///
    /// Deliberately shallow per the resume contract: `choices` requires an
    /// exact case-sensitive string match; `schema` only checks object-typed
    /// required properties and that string-typed properties are non-empty.
    /// Adopters may swap in a real JSON Schema validator without changing
    /// this function's external behavior.
    pub fn validate_human_input(pause: &PauseMetadata, human_input: &Value) -> Result<()> {
        if let Some(choices) = &pause.choices {
            let as_str = human_input.as_str().ok_or_else(|| {
                CheckpointError::Validation("human input must be a string when choices are set".into())
            })?;
            if !choices.iter().any(|c| c == as_str) {
                return Err(CheckpointError::Validation(format!(
                    "{as_str:?} is not one of the allowed choices {choices:?}"
                )));
            }
        }

        if let Some(schema) = &pause.schema {
            validate_shallow_schema(schema, human_input)?;
        }

        Ok(())
    }

    /// Resume behavior dictates whether the paused step itself is
    /// re-executed (`rerun`) or skipped past (`continue`).
    pub fn effective_start_step(pause: &PauseMetadata, paused_step: u32) -> u32 {
        match pause.resume_behavior {
            ResumeBehavior::Rerun => paused_step,
            ResumeBehavior::Continue => paused_step + 1,
        }
    }
}

fn validate_shallow_schema(schema: &Value, value: &Value) -> Result<()> {
    let obj = schema.as_object().ok_or_else(|| {
        CheckpointError::Validation("schema root must be an object".into())
    })?;

    if obj.get("type").and_then(Value::as_str) == Some("object") {
        let value_obj = value
            .as_object()
            .ok_or_else(|| CheckpointError::Validation("human input must be an object".into()))?;

        if let Some(required) = obj.get("required").and_then(Value::as_array) {
            for key in required {
                let key = key.as_str().unwrap_or_default();
                if !value_obj.contains_key(key) {
                    return Err(CheckpointError::Validation(format!("missing required property {key:?}")));
                }
            }
        }

        if let Some(properties) = obj.get("properties").and_then(Value::as_object) {
            for (prop_name, prop_schema) in properties {
                if prop_schema.get("type").and_then(Value::as_str) == Some("string") {
                    if let Some(v) = value_obj.get(prop_name) {
                        if v.as_str().map(|s| s.is_empty()).unwrap_or(true) {
                            return Err(CheckpointError::Validation(format!(
                                "property {prop_name:?} must be a non-empty string"
                            )));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Build a checkpoint recording a pause, as step 5 of the pipeline executor
/// algorithm calls for: `{status: paused, pauseMetadata, expiresAt}`.
pub fn paused_checkpoint(
    run_id: impl Into<String>,
    pipeline_id: impl Into<String>,
    step: u32,
    context: Value,
    pause: PauseMetadata,
    ttl_ms: Option<i64>,
) -> Checkpoint {
    let mut cp = Checkpoint::new(run_id, pipeline_id, step, context).with_pause_metadata(pause);
    if let Some(ttl) = ttl_ms {
        cp = cp.with_ttl(ttl);
    }
    cp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCheckpointStorage;
    use serde_json::json;

    fn pause() -> PauseMetadata {
        PauseMetadata::new("choose", ResumeBehavior::Continue)
            .with_choices(vec!["red".into(), "blue".into()])
    }

    #[tokio::test]
    async fn resume_fails_when_no_checkpoint() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        let manager = PauseManager::new(storage);
        let err = manager.begin_resume("missing", ResumeMode::Skip).await.unwrap_err();
        assert!(matches!(err, CheckpointError::PauseNotFound { .. }));
    }

    #[tokio::test]
    async fn resume_skip_starts_after_checkpoint_step() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        storage
            .save(Checkpoint::new("run-1", "pipe", 2, json!({"outputs": {}})).with_status(CheckpointStatus::Paused))
            .await
            .unwrap();

        let manager = PauseManager::new(storage);
        let handle = manager.begin_resume("run-1", ResumeMode::Skip).await.unwrap();
        assert_eq!(handle.start_step, 3);
    }

    #[tokio::test]
    async fn resume_restart_starts_at_zero() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        storage
            .save(Checkpoint::new("run-1", "pipe", 2, json!(null)).with_status(CheckpointStatus::Failed))
            .await
            .unwrap();

        let manager = PauseManager::new(storage);
        let handle = manager.begin_resume("run-1", ResumeMode::Restart).await.unwrap();
        assert_eq!(handle.start_step, 0);
    }

    #[tokio::test]
    async fn resume_rejects_in_progress() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        storage
            .save(Checkpoint::new("run-1", "pipe", 0, json!(null)).with_status(CheckpointStatus::InProgress))
            .await
            .unwrap();

        let manager = PauseManager::new(storage);
        let err = manager.begin_resume("run-1", ResumeMode::Skip).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Concurrency { .. }));
    }

    #[tokio::test]
    async fn resume_rejects_expired_pause() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        let mut cp = Checkpoint::new("run-1", "pipe", 0, json!(null)).with_pause_metadata(pause());
        cp.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        storage.save(cp).await.unwrap();

        let manager = PauseManager::new(storage.clone());
        let err = manager.begin_resume("run-1", ResumeMode::Skip).await.unwrap_err();
        assert!(matches!(err, CheckpointError::PauseExpired { .. }));

        let cp = storage.get("run-1", 0).await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Expired);
    }

    #[test]
    fn validate_human_input_rejects_unlisted_choice() {
        let err = PauseManager::validate_human_input(&pause(), &json!("green")).unwrap_err();
        assert!(matches!(err, CheckpointError::Validation(_)));
    }

    #[test]
    fn validate_human_input_accepts_listed_choice() {
        assert!(PauseManager::validate_human_input(&pause(), &json!("red")).is_ok());
    }

    #[test]
    fn validate_human_input_shallow_schema() {
        let p = PauseMetadata::new("fill form", ResumeBehavior::Continue).with_schema(json!({
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string"}}
        }));

        assert!(PauseManager::validate_human_input(&p, &json!({"name": "ok"})).is_ok());
        assert!(PauseManager::validate_human_input(&p, &json!({"name": ""})).is_err());
        assert!(PauseManager::validate_human_input(&p, &json!({})).is_err());
    }

    #[tokio::test]
    async fn two_concurrent_resumes_exactly_one_wins() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        storage
            .save(Checkpoint::new("run-1", "pipe", 0, json!(null)).with_status(CheckpointStatus::Paused))
            .await
            .unwrap();

        let manager = Arc::new(PauseManager::new(storage));
        let m1 = manager.clone();
        let m2 = manager.clone();
        let (r1, r2) = tokio::join!(
            m1.begin_resume("run-1", ResumeMode::Skip),
            m2.begin_resume("run-1", ResumeMode::Skip),
        );

        let successes = [r1.is_ok(), r2.is_ok()].iter().filter(|b| **b).count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn effective_start_step_respects_resume_behavior() {
        let rerun = PauseMetadata::new("p", ResumeBehavior::Rerun);
        let cont = PauseMetadata::new("p", ResumeBehavior::Continue);
        assert_eq!(PauseManager::effective_start_step(&rerun, 4), 4);
        assert_eq!(PauseManager::effective_start_step(&cont, 4), 5);
    }
}
