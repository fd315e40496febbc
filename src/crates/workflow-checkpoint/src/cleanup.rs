//! Background TTL cleanup task.
//!
//! Calls [`CheckpointStorage::delete_expired`] on an interval. Stoppable via
//! a [`tokio::sync::watch`] channel so the owner can shut it down without
//! leaking the spawned task, and idempotent (calling `delete_expired` twice
//! in a row is harmless).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::traits::CheckpointStorage;

/// Default interval between `delete_expired` sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default checkpoint TTL: 7 days, in milliseconds.
pub const DEFAULT_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Handle to a running cleanup task. Dropping it does not stop the task;
/// call [`CleanupHandle::stop`] explicitly.
pub struct CleanupHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.join.await;
    }
}

/// Spawn a task that calls `storage.delete_expired()` every `interval` until
/// stopped.
pub fn spawn_cleanup_task(storage: Arc<dyn CheckpointStorage>, interval: Duration) -> CleanupHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match storage.delete_expired().await {
                        Ok(n) if n > 0 => debug!(removed = n, "checkpoint cleanup swept expired rows"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "checkpoint cleanup sweep failed"),
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    CleanupHandle { stop_tx, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::memory::InMemoryCheckpointStorage;
    use serde_json::json;

    #[tokio::test]
    async fn cleanup_task_sweeps_expired_rows() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        let mut expired = Checkpoint::new("run-1", "pipe", 0, json!(null));
        expired.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        storage.save(expired).await.unwrap();

        let handle = spawn_cleanup_task(storage.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await;

        assert!(storage.get("run-1", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_task_stops_cleanly() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        let handle = spawn_cleanup_task(storage, Duration::from_secs(3600));
        handle.stop().await;
    }
}
