//! Persisted execution-state boundaries for the workflow engine.
//!
//! A [`checkpoint::Checkpoint`] is a `(run_id, step)`-keyed snapshot: enough
//! to resume a pipeline or graph run without replaying earlier steps. This
//! crate defines the data model, the pluggable [`traits::CheckpointStorage`]
//! adapter contract, an in-memory reference adapter ([`memory`]), a
//! background TTL sweep ([`cleanup`]), and the concurrency-guarded
//! resume/pause state machine ([`pause`]).
//!
//! `context` on a checkpoint is opaque `serde_json::Value` so this crate has
//! no dependency on `workflow-core`'s concrete `PipelineContext` type —
//! `workflow-core` serializes into and deserializes out of it.

pub mod checkpoint;
pub mod cleanup;
pub mod error;
pub mod memory;
pub mod pause;
pub mod traits;

pub use checkpoint::{Checkpoint, CheckpointStatus, PauseMetadata, ResumeBehavior};
pub use cleanup::{spawn_cleanup_task, CleanupHandle, DEFAULT_CLEANUP_INTERVAL, DEFAULT_TTL_MS};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStorage;
pub use pause::{paused_checkpoint, PauseManager, ResumeHandle, ResumeMode};
pub use traits::CheckpointStorage;
