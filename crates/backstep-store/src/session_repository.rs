use async_trait::async_trait;
use backstep_core::error::{EngineError, EngineResult};
use backstep_core::model::{ExternalSession, InternalSession, User};
use backstep_core::session::SessionStorage;
use tracing::instrument;

use crate::rows::{external_session_from_row, internal_session_from_row, user_from_row};
use crate::SqliteStore;

async fn internal_session_ids_for(pool: &sqlx::SqlitePool, external_session_id: i64) -> EngineResult<Vec<i64>> {
    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT internal_session_id FROM internal_sessions
         WHERE parent_external_session_id = ? ORDER BY created_at ASC",
    )
    .bind(external_session_id)
    .fetch_all(pool)
    .await
    .map_err(|e| EngineError::storage(e.to_string()))?;
    Ok(rows)
}

#[async_trait]
impl SessionStorage for SqliteStore {
    #[instrument(skip(self, credential_hash))]
    async fn create_user(&self, username: &str, credential_hash: &str) -> EngineResult<User> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO users (username, credential_hash, is_admin, created_at, updated_at)
             VALUES (?, ?, 0, ?, ?)",
        )
        .bind(username)
        .bind(credential_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::integrity(e.to_string()))?;

        let user_id = result.last_insert_rowid();
        self.get_user_by_username(username)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("user {user_id}")))
    }

    async fn get_user_by_username(&self, username: &str) -> EngineResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn delete_user_cascade(&self, user_id: i64) -> EngineResult<()> {
        sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;
        Ok(())
    }

    async fn create_external_session(&self, owner_user_id: i64, display_name: &str) -> EngineResult<ExternalSession> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO external_sessions
             (owner_user_id, display_name, is_active, current_internal_session_id, created_at, updated_at)
             VALUES (?, ?, 1, NULL, ?, ?)",
        )
        .bind(owner_user_id)
        .bind(display_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::integrity(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_external_session(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("external session {id}")))
    }

    async fn get_external_session(&self, external_session_id: i64) -> EngineResult<Option<ExternalSession>> {
        let row = sqlx::query("SELECT * FROM external_sessions WHERE external_session_id = ?")
            .bind(external_session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;

        match row {
            Some(row) => {
                let children = internal_session_ids_for(&self.pool, external_session_id).await?;
                Ok(Some(external_session_from_row(&row, children)?))
            }
            None => Ok(None),
        }
    }

    async fn list_external_sessions_by_user(&self, owner_user_id: i64) -> EngineResult<Vec<ExternalSession>> {
        let rows = sqlx::query("SELECT * FROM external_sessions WHERE owner_user_id = ? ORDER BY created_at ASC")
            .bind(owner_user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let external_session_id: i64 = sqlx::Row::try_get(row, "external_session_id")
                .map_err(|e| EngineError::storage(e.to_string()))?;
            let children = internal_session_ids_for(&self.pool, external_session_id).await?;
            sessions.push(external_session_from_row(row, children)?);
        }
        Ok(sessions)
    }

    async fn save_external_session(&self, session: &ExternalSession) -> EngineResult<()> {
        sqlx::query(
            "UPDATE external_sessions
             SET display_name = ?, is_active = ?, current_internal_session_id = ?, updated_at = ?
             WHERE external_session_id = ?",
        )
        .bind(&session.display_name)
        .bind(session.is_active as i64)
        .bind(session.current_internal_session_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(session.external_session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_internal_session(&self, external_session_id: i64) -> EngineResult<InternalSession> {
        let now = chrono::Utc::now().to_rfc3339();
        let model_session_id = uuid::Uuid::new_v4().to_string();
        let empty_state = serde_json::to_string(&serde_json::json!({}))?;
        let empty_history = serde_json::to_string(&Vec::<backstep_core::model::HistoryEntry>::new())?;

        let result = sqlx::query(
            "INSERT INTO internal_sessions
             (parent_external_session_id, model_session_id, session_state, conversation_history,
              is_current, checkpoint_counter, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(external_session_id)
        .bind(&model_session_id)
        .bind(&empty_state)
        .bind(&empty_history)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::integrity(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.get_internal_session(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("internal session {id}")))
    }

    async fn get_internal_session(&self, internal_session_id: i64) -> EngineResult<Option<InternalSession>> {
        let row = sqlx::query("SELECT * FROM internal_sessions WHERE internal_session_id = ?")
            .bind(internal_session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;
        row.as_ref().map(internal_session_from_row).transpose()
    }

    async fn list_internal_sessions_by_external(&self, external_session_id: i64) -> EngineResult<Vec<InternalSession>> {
        let rows = sqlx::query(
            "SELECT * FROM internal_sessions WHERE parent_external_session_id = ? ORDER BY created_at ASC",
        )
        .bind(external_session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;
        rows.iter().map(internal_session_from_row).collect()
    }

    async fn get_current_internal_session(&self, external_session_id: i64) -> EngineResult<Option<InternalSession>> {
        let row = sqlx::query(
            "SELECT * FROM internal_sessions
             WHERE parent_external_session_id = ? AND is_current = 1
             LIMIT 1",
        )
        .bind(external_session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;
        row.as_ref().map(internal_session_from_row).transpose()
    }

    async fn save_internal_session(&self, session: &InternalSession) -> EngineResult<()> {
        let state_json = serde_json::to_string(&session.session_state)?;
        let history_json = serde_json::to_string(&session.conversation_history)?;

        sqlx::query(
            "UPDATE internal_sessions
             SET session_state = ?, conversation_history = ?, is_current = ?,
                 checkpoint_counter = ?, updated_at = ?
             WHERE internal_session_id = ?",
        )
        .bind(&state_json)
        .bind(&history_json)
        .bind(session.is_current as i64)
        .bind(session.checkpoint_counter as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(session.internal_session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;
        Ok(())
    }

    /// Demotes whichever internal session was previously current and
    /// promotes `internal_session_id`, plus updates the external session's
    /// pointer, all inside one transaction.
    #[instrument(skip(self))]
    async fn set_current_internal_session(&self, external_session_id: i64, internal_session_id: i64) -> EngineResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;

        sqlx::query("UPDATE internal_sessions SET is_current = 0 WHERE parent_external_session_id = ?")
            .bind(external_session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;

        sqlx::query("UPDATE internal_sessions SET is_current = 1 WHERE internal_session_id = ?")
            .bind(internal_session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;

        sqlx::query(
            "UPDATE external_sessions SET current_internal_session_id = ?, updated_at = ? WHERE external_session_id = ?",
        )
        .bind(internal_session_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(external_session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;

        tx.commit().await.map_err(|e| EngineError::storage(e.to_string()))?;
        Ok(())
    }
}
