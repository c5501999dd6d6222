use async_trait::async_trait;

use crate::error::EngineResult;
use crate::model::Checkpoint;

/// Durable persistence for checkpoints.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> EngineResult<Checkpoint>;
    async fn get_checkpoint(&self, checkpoint_id: i64) -> EngineResult<Option<Checkpoint>>;

    /// Checkpoints owned by `internal_session_id`, newest-first.
    async fn list_checkpoints(&self, internal_session_id: i64) -> EngineResult<Vec<Checkpoint>>;

    /// Automatic checkpoints owned by `internal_session_id`, newest-first.
    async fn list_auto_checkpoints(&self, internal_session_id: i64) -> EngineResult<Vec<Checkpoint>>;

    async fn delete_checkpoint(&self, checkpoint_id: i64) -> EngineResult<()>;

    /// Deletes all automatic checkpoints owned by `internal_session_id`
    /// except the `keep_latest` most recent. Manual checkpoints are
    /// untouched. No-op if fewer than `keep_latest` automatic checkpoints
    /// exist.
    async fn prune_auto_checkpoints(&self, internal_session_id: i64, keep_latest: usize) -> EngineResult<usize>;

    /// Persists `checkpoint` under a new owning internal session id,
    /// assigning it a fresh checkpoint id. Used to copy lineage on fork.
    async fn copy_checkpoint_to(&self, checkpoint: &Checkpoint, new_owner_internal_session_id: i64) -> EngineResult<Checkpoint>;
}
