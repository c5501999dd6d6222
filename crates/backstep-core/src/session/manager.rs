use std::sync::Arc;

use tracing::instrument;

use crate::checkpoints::CheckpointStorage;
use crate::error::{EngineError, EngineResult};
use crate::model::{Checkpoint, InternalSession, Role};

use super::storage::SessionStorage;

/// Creates, forks, and resumes internal sessions under an external session.
///
/// Never deletes internal sessions implicitly; removal is cascade-only
/// through the external session.
pub struct SessionManager {
    sessions: Arc<dyn SessionStorage>,
    checkpoints: Arc<dyn CheckpointStorage>,
}

impl SessionManager {
    pub fn new(sessions: Arc<dyn SessionStorage>, checkpoints: Arc<dyn CheckpointStorage>) -> Self {
        Self { sessions, checkpoints }
    }

    /// Creates a fresh internal session, marking it current (demoting any
    /// prior current one in the same external session).
    #[instrument(skip(self))]
    pub async fn new_internal_session(&self, external_session_id: i64) -> EngineResult<InternalSession> {
        let session = self.sessions.create_internal_session(external_session_id).await?;
        self.sessions
            .set_current_internal_session(external_session_id, session.internal_session_id)
            .await?;
        Ok(session)
    }

    /// Loads and marks current. If `internal_session_id` is `None`, uses the
    /// external session's `current` pointer.
    #[instrument(skip(self))]
    pub async fn resume(
        &self,
        external_session_id: i64,
        internal_session_id: Option<i64>,
    ) -> EngineResult<InternalSession> {
        let session = match internal_session_id {
            Some(id) => self
                .sessions
                .get_internal_session(id)
                .await?
                .ok_or_else(|| EngineError::not_found(format!("internal session {id}")))?,
            None => self
                .sessions
                .get_current_internal_session(external_session_id)
                .await?
                .ok_or_else(|| {
                    EngineError::not_found(format!(
                        "no current internal session for external session {external_session_id}"
                    ))
                })?,
        };

        if session.parent_external_session_id != external_session_id {
            return Err(EngineError::not_found(format!(
                "internal session {} does not belong to external session {external_session_id}",
                session.internal_session_id
            )));
        }

        self.sessions
            .set_current_internal_session(external_session_id, session.internal_session_id)
            .await?;
        Ok(session)
    }

    #[instrument(skip(self, content))]
    pub async fn append_turn(
        &self,
        internal_session_id: i64,
        role: Role,
        content: impl Into<String> + std::fmt::Debug,
    ) -> EngineResult<InternalSession> {
        let mut session = self
            .sessions
            .get_internal_session(internal_session_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("internal session {internal_session_id}")))?;
        session.append_turn(role, content);
        self.sessions.save_internal_session(&session).await?;
        Ok(session)
    }

    /// Sets one key in the internal session's state map and persists it.
    /// Used by the built-in checkpoint tools (e.g. `rollback_requested`).
    pub async fn set_state(
        &self,
        internal_session_id: i64,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> EngineResult<InternalSession> {
        let mut session = self
            .sessions
            .get_internal_session(internal_session_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("internal session {internal_session_id}")))?;
        session.set_state(key, value);
        self.sessions.save_internal_session(&session).await?;
        Ok(session)
    }

    /// Constructs a Checkpoint by deep-copying state and history, stamps
    /// `track_index` into metadata, increments the checkpoint counter, and
    /// persists it.
    #[instrument(skip(self))]
    pub async fn snapshot(
        &self,
        internal_session_id: i64,
        name: Option<String>,
        is_auto: bool,
        track_index: usize,
    ) -> EngineResult<Checkpoint> {
        let mut session = self
            .sessions
            .get_internal_session(internal_session_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("internal session {internal_session_id}")))?;

        let checkpoint = Checkpoint::new(
            0, // assigned by storage
            internal_session_id,
            name,
            is_auto,
            session.session_state.clone(),
            session.conversation_history.clone(),
            track_index,
        );
        let saved = self.checkpoints.save_checkpoint(&checkpoint).await?;

        session.checkpoint_counter += 1;
        self.sessions.save_internal_session(&session).await?;

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExternalSession, User};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct InMemoryStore {
        users: Mutex<HashMap<i64, User>>,
        externals: Mutex<HashMap<i64, ExternalSession>>,
        internals: Mutex<HashMap<i64, InternalSession>>,
        checkpoints: Mutex<HashMap<i64, Checkpoint>>,
        next_id: Mutex<i64>,
    }

    impl InMemoryStore {
        fn next(&self) -> i64 {
            let mut id = self.next_id.lock();
            *id += 1;
            *id
        }
    }

    #[async_trait]
    impl SessionStorage for InMemoryStore {
        async fn create_user(&self, username: &str, credential_hash: &str) -> EngineResult<User> {
            let id = self.next();
            let user = User::new(id, username, credential_hash);
            self.users.lock().insert(id, user.clone());
            Ok(user)
        }
        async fn get_user_by_username(&self, username: &str) -> EngineResult<Option<User>> {
            Ok(self.users.lock().values().find(|u| u.username == username).cloned())
        }
        async fn delete_user_cascade(&self, user_id: i64) -> EngineResult<()> {
            self.users.lock().remove(&user_id);
            Ok(())
        }
        async fn create_external_session(&self, owner_user_id: i64, display_name: &str) -> EngineResult<ExternalSession> {
            let id = self.next();
            let session = ExternalSession::new(id, owner_user_id, display_name);
            self.externals.lock().insert(id, session.clone());
            Ok(session)
        }
        async fn get_external_session(&self, id: i64) -> EngineResult<Option<ExternalSession>> {
            Ok(self.externals.lock().get(&id).cloned())
        }
        async fn list_external_sessions_by_user(&self, owner_user_id: i64) -> EngineResult<Vec<ExternalSession>> {
            Ok(self
                .externals
                .lock()
                .values()
                .filter(|s| s.owner_user_id == owner_user_id)
                .cloned()
                .collect())
        }
        async fn save_external_session(&self, session: &ExternalSession) -> EngineResult<()> {
            self.externals.lock().insert(session.external_session_id, session.clone());
            Ok(())
        }
        async fn create_internal_session(&self, external_session_id: i64) -> EngineResult<InternalSession> {
            let id = self.next();
            let session = InternalSession::new(id, external_session_id);
            self.internals.lock().insert(id, session.clone());
            let mut externals = self.externals.lock();
            if let Some(ext) = externals.get_mut(&external_session_id) {
                ext.push_internal_session(id);
            }
            Ok(session)
        }
        async fn get_internal_session(&self, id: i64) -> EngineResult<Option<InternalSession>> {
            Ok(self.internals.lock().get(&id).cloned())
        }
        async fn list_internal_sessions_by_external(&self, external_session_id: i64) -> EngineResult<Vec<InternalSession>> {
            Ok(self
                .internals
                .lock()
                .values()
                .filter(|s| s.parent_external_session_id == external_session_id)
                .cloned()
                .collect())
        }
        async fn get_current_internal_session(&self, external_session_id: i64) -> EngineResult<Option<InternalSession>> {
            Ok(self
                .internals
                .lock()
                .values()
                .find(|s| s.parent_external_session_id == external_session_id && s.is_current)
                .cloned())
        }
        async fn save_internal_session(&self, session: &InternalSession) -> EngineResult<()> {
            self.internals.lock().insert(session.internal_session_id, session.clone());
            Ok(())
        }
        async fn set_current_internal_session(&self, external_session_id: i64, internal_session_id: i64) -> EngineResult<()> {
            let mut internals = self.internals.lock();
            for session in internals.values_mut() {
                if session.parent_external_session_id == external_session_id {
                    session.is_current = session.internal_session_id == internal_session_id;
                }
            }
            let mut externals = self.externals.lock();
            if let Some(ext) = externals.get_mut(&external_session_id) {
                ext.current_internal_session_id = Some(internal_session_id);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CheckpointStorage for InMemoryStore {
        async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> EngineResult<Checkpoint> {
            let id = self.next();
            let mut saved = checkpoint.clone();
            saved.checkpoint_id = id;
            self.checkpoints.lock().insert(id, saved.clone());
            Ok(saved)
        }
        async fn get_checkpoint(&self, id: i64) -> EngineResult<Option<Checkpoint>> {
            Ok(self.checkpoints.lock().get(&id).cloned())
        }
        async fn list_checkpoints(&self, internal_session_id: i64) -> EngineResult<Vec<Checkpoint>> {
            let mut v: Vec<_> = self
                .checkpoints
                .lock()
                .values()
                .filter(|c| c.owning_internal_session_id == internal_session_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
        async fn list_auto_checkpoints(&self, internal_session_id: i64) -> EngineResult<Vec<Checkpoint>> {
            Ok(self
                .list_checkpoints(internal_session_id)
                .await?
                .into_iter()
                .filter(|c| c.is_auto)
                .collect())
        }
        async fn delete_checkpoint(&self, id: i64) -> EngineResult<()> {
            self.checkpoints.lock().remove(&id);
            Ok(())
        }
        async fn prune_auto_checkpoints(&self, internal_session_id: i64, keep_latest: usize) -> EngineResult<usize> {
            let autos = self.list_auto_checkpoints(internal_session_id).await?;
            if autos.len() <= keep_latest {
                return Ok(0);
            }
            let to_delete = &autos[keep_latest..];
            let mut count = 0;
            for c in to_delete {
                self.checkpoints.lock().remove(&c.checkpoint_id);
                count += 1;
            }
            Ok(count)
        }
        async fn copy_checkpoint_to(&self, checkpoint: &Checkpoint, new_owner_internal_session_id: i64) -> EngineResult<Checkpoint> {
            let id = self.next();
            let mut copy = checkpoint.clone();
            copy.checkpoint_id = id;
            copy.owning_internal_session_id = new_owner_internal_session_id;
            self.checkpoints.lock().insert(id, copy.clone());
            Ok(copy)
        }
    }

    fn manager() -> (SessionManager, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::default());
        (SessionManager::new(store.clone(), store.clone()), store)
    }

    #[tokio::test]
    async fn new_internal_session_becomes_current() {
        let (manager, store) = manager();
        let ext = store.create_external_session(1, "conversation").await.unwrap();

        let first = manager.new_internal_session(ext.external_session_id).await.unwrap();
        assert!(first.is_current);

        let second = manager.new_internal_session(ext.external_session_id).await.unwrap();
        assert!(second.is_current);

        let reloaded_first = store.get_internal_session(first.internal_session_id).await.unwrap().unwrap();
        assert!(!reloaded_first.is_current);
    }

    #[tokio::test]
    async fn resume_without_explicit_id_uses_current_pointer() {
        let (manager, store) = manager();
        let ext = store.create_external_session(1, "conversation").await.unwrap();
        let created = manager.new_internal_session(ext.external_session_id).await.unwrap();

        let resumed = manager.resume(ext.external_session_id, None).await.unwrap();
        assert_eq!(resumed.internal_session_id, created.internal_session_id);
    }

    #[tokio::test]
    async fn resume_rejects_session_from_another_external_session() {
        let (manager, store) = manager();
        let ext_a = store.create_external_session(1, "a").await.unwrap();
        let ext_b = store.create_external_session(1, "b").await.unwrap();
        let session_a = manager.new_internal_session(ext_a.external_session_id).await.unwrap();

        let result = manager
            .resume(ext_b.external_session_id, Some(session_a.internal_session_id))
            .await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn snapshot_captures_track_position_and_increments_counter() {
        let (manager, store) = manager();
        let ext = store.create_external_session(1, "conversation").await.unwrap();
        let session = manager.new_internal_session(ext.external_session_id).await.unwrap();

        manager
            .append_turn(session.internal_session_id, Role::User, "hello")
            .await
            .unwrap();

        let checkpoint = manager
            .snapshot(session.internal_session_id, Some("A".to_string()), false, 3)
            .await
            .unwrap();

        assert_eq!(checkpoint.tool_track_position(), 3);
        assert_eq!(checkpoint.conversation_history.len(), 1);

        let reloaded = store.get_internal_session(session.internal_session_id).await.unwrap().unwrap();
        assert_eq!(reloaded.checkpoint_counter, 1);
    }
}
