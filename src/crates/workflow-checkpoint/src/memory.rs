//! In-memory [`CheckpointStorage`] reference implementation.
//!
//! Checkpoints are kept as `Arc<RwLock<HashMap<run_id, Vec<Checkpoint>>>>`,
//! one vector per run ordered by `step`. This is the reference adapter used
//! by tests and by callers that don't need cross-process durability; the
//! trait is the seam for swapping in a real store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::checkpoint::{Checkpoint, CheckpointStatus};
use crate::error::Result;
use crate::traits::CheckpointStorage;

#[derive(Default)]
pub struct InMemoryCheckpointStorage {
    runs: Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryCheckpointStorage {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut runs = self.runs.write().await;
        let entries = runs.entry(checkpoint.run_id.clone()).or_default();
        if let Some(existing) = entries.iter_mut().find(|c| c.step == checkpoint.step) {
            *existing = checkpoint;
        } else {
            entries.push(checkpoint);
            entries.sort_by_key(|c| c.step);
        }
        Ok(())
    }

    async fn get(&self, run_id: &str, step: u32) -> Result<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(run_id)
            .and_then(|entries| entries.iter().find(|c| c.step == step).cloned()))
    }

    async fn get_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).and_then(|entries| entries.last().cloned()))
    }

    async fn update_status(&self, run_id: &str, step: u32, status: CheckpointStatus) -> Result<()> {
        let mut runs = self.runs.write().await;
        if let Some(entries) = runs.get_mut(run_id) {
            if let Some(cp) = entries.iter_mut().find(|c| c.step == step) {
                cp.status = status;
                cp.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        self.runs.write().await.remove(run_id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut runs = self.runs.write().await;
        let mut removed = 0;
        for entries in runs.values_mut() {
            let before = entries.len();
            entries.retain(|c| !c.is_expired(now));
            removed += before - entries.len();
        }
        runs.retain(|_, entries| !entries.is_empty());
        Ok(removed)
    }

    async fn list_by_status(&self, status: CheckpointStatus) -> Result<Vec<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn compare_and_swap_status(
        &self,
        run_id: &str,
        step: u32,
        expected: CheckpointStatus,
        next: CheckpointStatus,
    ) -> Result<bool> {
        let mut runs = self.runs.write().await;
        let Some(entries) = runs.get_mut(run_id) else { return Ok(false) };
        let Some(cp) = entries.iter_mut().find(|c| c.step == step) else { return Ok(false) };
        if cp.status != expected {
            return Ok(false);
        }
        cp.status = next;
        cp.updated_at = Utc::now();
        Ok(true)
    }
}
