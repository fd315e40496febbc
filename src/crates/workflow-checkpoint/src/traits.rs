//! The [`CheckpointStorage`] adapter contract.
//!
//! Implementations are pluggable (in-memory, SQL, KV store); the engine only
//! ever talks to this trait. All methods are async because real adapters
//! cross an I/O boundary; the in-memory reference implementation in
//! [`crate::memory`] is the only one this crate ships.

use async_trait::async_trait;

use crate::checkpoint::{Checkpoint, CheckpointStatus};
use crate::error::Result;

/// Storage adapter for checkpoints, keyed by `(run_id, step)`.
///
/// `save` is an upsert: calling it twice with the same `(run_id, step)`
/// replaces the prior row rather than appending.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Upsert a checkpoint at `(checkpoint.run_id, checkpoint.step)`.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Fetch the checkpoint at an exact step, if any.
    async fn get(&self, run_id: &str, step: u32) -> Result<Option<Checkpoint>>;

    /// Fetch the highest-`step` checkpoint for a run, if any.
    async fn get_latest(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Transition the checkpoint at `(run_id, step)` to `status`, bumping
    /// `updated_at`. No-op if the checkpoint does not exist.
    async fn update_status(&self, run_id: &str, step: u32, status: CheckpointStatus) -> Result<()>;

    /// Remove every checkpoint belonging to a run.
    async fn delete_run(&self, run_id: &str) -> Result<()>;

    /// Remove every checkpoint whose `expires_at` has passed, returning the
    /// count removed. Safe to call repeatedly; idempotent.
    async fn delete_expired(&self) -> Result<usize>;

    /// List every checkpoint currently in `status`, across all runs.
    async fn list_by_status(&self, status: CheckpointStatus) -> Result<Vec<Checkpoint>>;

    /// Atomically transition `(run_id, step)` from `expected` to `next`,
    /// returning `true` if this call performed the transition and `false` if
    /// the checkpoint was not in `expected` state (lost the race, or does
    /// not exist). This is the primitive [`crate::pause::PauseManager`] uses
    /// to guarantee exactly one concurrent resume wins.
    async fn compare_and_swap_status(
        &self,
        run_id: &str,
        step: u32,
        expected: CheckpointStatus,
        next: CheckpointStatus,
    ) -> Result<bool>;

    /// Release any resources held by the adapter (connection pools, etc).
    /// Default is a no-op, matching the in-memory adapter.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
