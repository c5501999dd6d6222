use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::model::{ExternalSession, InternalSession, User, ROOT_USERNAME};

/// Durable persistence for users, external sessions, and internal sessions.
///
/// Implementations (see the `backstep-store` crate) must run compound
/// operations such as "fork internal session" inside a single transaction.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn create_user(&self, username: &str, credential_hash: &str) -> EngineResult<User>;
    async fn get_user_by_username(&self, username: &str) -> EngineResult<Option<User>>;

    /// Unguarded cascade delete. Callers outside this trait should go
    /// through [`SessionStorage::delete_user`] instead, which enforces the
    /// admin-only, root-undeletable rule before reaching this.
    async fn delete_user_cascade(&self, user_id: i64) -> EngineResult<()>;

    /// Deletes `target_username`, enforcing that only an admin may delete a
    /// user and that the root user can never be deleted.
    async fn delete_user(&self, acting_user: &User, target_username: &str) -> EngineResult<()> {
        if !acting_user.is_admin {
            return Err(EngineError::permission_denied(format!(
                "user '{}' is not an admin and cannot delete users",
                acting_user.username
            )));
        }
        if target_username == ROOT_USERNAME {
            return Err(EngineError::permission_denied("the root user cannot be deleted"));
        }
        let target = self
            .get_user_by_username(target_username)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("user '{target_username}'")))?;
        self.delete_user_cascade(target.user_id).await
    }

    async fn create_external_session(&self, owner_user_id: i64, display_name: &str) -> EngineResult<ExternalSession>;
    async fn get_external_session(&self, external_session_id: i64) -> EngineResult<Option<ExternalSession>>;
    async fn list_external_sessions_by_user(&self, owner_user_id: i64) -> EngineResult<Vec<ExternalSession>>;
    async fn save_external_session(&self, session: &ExternalSession) -> EngineResult<()>;

    async fn create_internal_session(&self, external_session_id: i64) -> EngineResult<InternalSession>;
    async fn get_internal_session(&self, internal_session_id: i64) -> EngineResult<Option<InternalSession>>;
    async fn list_internal_sessions_by_external(&self, external_session_id: i64) -> EngineResult<Vec<InternalSession>>;
    async fn get_current_internal_session(&self, external_session_id: i64) -> EngineResult<Option<InternalSession>>;
    async fn save_internal_session(&self, session: &InternalSession) -> EngineResult<()>;

    /// Marks `internal_session_id` current for its external session and
    /// demotes whichever internal session was previously current, in one
    /// transaction.
    async fn set_current_internal_session(&self, external_session_id: i64, internal_session_id: i64) -> EngineResult<()>;
}
