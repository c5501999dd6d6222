use async_trait::async_trait;
use backstep_core::checkpoints::CheckpointStorage;
use backstep_core::error::{EngineError, EngineResult};
use backstep_core::model::Checkpoint;
use tracing::instrument;

use crate::rows::checkpoint_from_row;
use crate::SqliteStore;

#[async_trait]
impl CheckpointStorage for SqliteStore {
    #[instrument(skip(self, checkpoint))]
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> EngineResult<Checkpoint> {
        let state_json = serde_json::to_string(&checkpoint.session_state)?;
        let history_json = serde_json::to_string(&checkpoint.conversation_history)?;
        let metadata_json = serde_json::to_string(&checkpoint.metadata)?;

        let result = sqlx::query(
            "INSERT INTO checkpoints
             (owning_internal_session_id, name, is_auto, session_state, conversation_history, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(checkpoint.owning_internal_session_id)
        .bind(&checkpoint.name)
        .bind(checkpoint.is_auto as i64)
        .bind(&state_json)
        .bind(&history_json)
        .bind(&metadata_json)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::integrity(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_checkpoint(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("checkpoint {id}")))
    }

    async fn get_checkpoint(&self, checkpoint_id: i64) -> EngineResult<Option<Checkpoint>> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE checkpoint_id = ?")
            .bind(checkpoint_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;
        row.as_ref().map(checkpoint_from_row).transpose()
    }

    async fn list_checkpoints(&self, internal_session_id: i64) -> EngineResult<Vec<Checkpoint>> {
        let rows = sqlx::query(
            "SELECT * FROM checkpoints
             WHERE owning_internal_session_id = ?
             ORDER BY created_at DESC",
        )
        .bind(internal_session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;
        rows.iter().map(checkpoint_from_row).collect()
    }

    async fn list_auto_checkpoints(&self, internal_session_id: i64) -> EngineResult<Vec<Checkpoint>> {
        let rows = sqlx::query(
            "SELECT * FROM checkpoints
             WHERE owning_internal_session_id = ? AND is_auto = 1
             ORDER BY created_at DESC",
        )
        .bind(internal_session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;
        rows.iter().map(checkpoint_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn delete_checkpoint(&self, checkpoint_id: i64) -> EngineResult<()> {
        sqlx::query("DELETE FROM checkpoints WHERE checkpoint_id = ?")
            .bind(checkpoint_id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;
        Ok(())
    }

    /// Keeps the `keep_latest` most-recent automatic checkpoints for
    /// `internal_session_id`, deleting older ones. Manual checkpoints are
    /// untouched. No-op if fewer than `keep_latest` auto checkpoints exist.
    #[instrument(skip(self))]
    async fn prune_auto_checkpoints(&self, internal_session_id: i64, keep_latest: usize) -> EngineResult<usize> {
        let keep_ids = sqlx::query_scalar::<_, i64>(
            "SELECT checkpoint_id FROM checkpoints
             WHERE owning_internal_session_id = ? AND is_auto = 1
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(internal_session_id)
        .bind(keep_latest as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;

        if keep_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = keep_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = format!(
            "DELETE FROM checkpoints
             WHERE owning_internal_session_id = ? AND is_auto = 1
             AND checkpoint_id NOT IN ({placeholders})"
        );
        let mut q = sqlx::query(&query).bind(internal_session_id);
        for id in &keep_ids {
            q = q.bind(id);
        }
        let result = q.execute(&self.pool).await.map_err(|e| EngineError::storage(e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }

    /// Used when forking a new internal session from a checkpoint: persists
    /// `checkpoint` under `new_owner_internal_session_id` with a fresh id,
    /// preserving lineage.
    #[instrument(skip(self, checkpoint))]
    async fn copy_checkpoint_to(&self, checkpoint: &Checkpoint, new_owner_internal_session_id: i64) -> EngineResult<Checkpoint> {
        let state_json = serde_json::to_string(&checkpoint.session_state)?;
        let history_json = serde_json::to_string(&checkpoint.conversation_history)?;
        let metadata_json = serde_json::to_string(&checkpoint.metadata)?;

        let result = sqlx::query(
            "INSERT INTO checkpoints
             (owning_internal_session_id, name, is_auto, session_state, conversation_history, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_owner_internal_session_id)
        .bind(&checkpoint.name)
        .bind(checkpoint.is_auto as i64)
        .bind(&state_json)
        .bind(&history_json)
        .bind(&metadata_json)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::integrity(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_checkpoint(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("checkpoint {id}")))
    }
}
