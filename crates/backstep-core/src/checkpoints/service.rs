use std::sync::Arc;

use tracing::instrument;

use crate::error::{EngineError, EngineResult};
use crate::model::{Checkpoint, InternalSession};
use crate::session::SessionStorage;
use crate::tools::{ReverseInvocationResult, ToolRegistry};

use super::storage::CheckpointStorage;

/// Result of a rollback: the freshly forked internal session plus whatever
/// the tool registry reported while undoing world effects.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub new_internal_session: InternalSession,
    pub checkpoint: Checkpoint,
    pub reverse_results: Vec<ReverseInvocationResult>,
    pub lineage_copied: usize,
}

/// Glues the Store, Tool Registry, and Session Manager together: on
/// rollback, reverses tools above a saved track index, then forks a new
/// internal session seeded from the checkpoint snapshot.
pub struct CheckpointService {
    sessions: Arc<dyn SessionStorage>,
    checkpoints: Arc<dyn CheckpointStorage>,
}

impl CheckpointService {
    pub fn new(sessions: Arc<dyn SessionStorage>, checkpoints: Arc<dyn CheckpointStorage>) -> Self {
        Self { sessions, checkpoints }
    }

    /// Executes the rollback state transition:
    /// `(current = S_old) -> (current = S_new, Track_{S_new} = truncate(Track_{S_old}, idx))`.
    ///
    /// Store failures abort before the fork (step 3); reverse-handler
    /// failures are reported but do not abort.
    #[instrument(skip(self, registry))]
    pub async fn rollback(
        &self,
        external_session_id: i64,
        checkpoint_id: i64,
        rollback_tools: bool,
        registry: Option<&mut ToolRegistry>,
    ) -> EngineResult<RollbackOutcome> {
        let checkpoint = self
            .checkpoints
            .get_checkpoint(checkpoint_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("checkpoint {checkpoint_id}")))?;

        let reverse_results = if rollback_tools {
            match registry {
                Some(registry) => registry.rollback_from(checkpoint.tool_track_position())?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let source_internal_session_id = checkpoint.owning_internal_session_id;
        let source_session = self
            .sessions
            .get_internal_session(source_internal_session_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("internal session {source_internal_session_id}")))?;

        // Step 3: fork a new internal session seeded by deep-copying the
        // checkpoint's state and history.
        let mut new_session = self.sessions.create_internal_session(external_session_id).await?;
        new_session.session_state = checkpoint.session_state.clone();
        new_session.conversation_history = checkpoint.conversation_history.clone();
        self.sessions.save_internal_session(&new_session).await?;

        // Step 4: checkpoint lineage preservation.
        let source_checkpoints = self.checkpoints.list_checkpoints(source_internal_session_id).await?;
        let mut lineage_copied = 0;
        for older in source_checkpoints
            .iter()
            .filter(|c| c.created_at <= checkpoint.created_at)
        {
            self.checkpoints
                .copy_checkpoint_to(older, new_session.internal_session_id)
                .await?;
            lineage_copied += 1;
        }

        // Step 5: mark the new internal session current, demoting the old.
        self.sessions
            .set_current_internal_session(external_session_id, new_session.internal_session_id)
            .await?;

        Ok(RollbackOutcome {
            new_internal_session: new_session,
            checkpoint,
            reverse_results,
            lineage_copied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExternalSession, Role, User};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

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

    #[tokio::test]
    async fn rollback_preserves_checkpoint_lineage_up_to_target() {
        let store = StdArc::new(InMemoryStore::default());
        let service = CheckpointService::new(store.clone(), store.clone());

        let ext = store.create_external_session(1, "conversation").await.unwrap();
        let session = store.create_internal_session(ext.external_session_id).await.unwrap();

        let a = store
            .save_checkpoint(&Checkpoint::new(0, session.internal_session_id, Some("A".into()), false, HashMap::new(), vec![], 0))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let b = store
            .save_checkpoint(&Checkpoint::new(0, session.internal_session_id, Some("B".into()), false, HashMap::new(), vec![], 0))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let _c = store
            .save_checkpoint(&Checkpoint::new(0, session.internal_session_id, Some("C".into()), false, HashMap::new(), vec![], 0))
            .await
            .unwrap();
        let _ = a;

        let outcome = service
            .rollback(ext.external_session_id, b.checkpoint_id, false, None)
            .await
            .unwrap();

        let new_checkpoints = store
            .list_checkpoints(outcome.new_internal_session.internal_session_id)
            .await
            .unwrap();
        let mut names: Vec<String> = new_checkpoints.into_iter().filter_map(|c| c.name).collect();
        names.sort();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(outcome.lineage_copied, 2);

        let reloaded_ext = store.get_external_session(ext.external_session_id).await.unwrap().unwrap();
        assert_eq!(
            reloaded_ext.current_internal_session_id,
            Some(outcome.new_internal_session.internal_session_id)
        );
    }

    #[tokio::test]
    async fn rollback_reverses_tools_when_requested() {
        let store = StdArc::new(InMemoryStore::default());
        let service = CheckpointService::new(store.clone(), store.clone());

        let ext = store.create_external_session(1, "conversation").await.unwrap();
        let session = store.create_internal_session(ext.external_session_id).await.unwrap();

        let checkpoint = store
            .save_checkpoint(&Checkpoint::new(0, session.internal_session_id, None, true, HashMap::new(), vec![], 0))
            .await
            .unwrap();

        let flag = StdArc::new(StdMutex::new(false));
        let flag_clone = flag.clone();
        let mut registry = ToolRegistry::new();
        registry
            .register(crate::tools::ToolSpec::new(
                "create_file",
                StdArc::new(|_args| Ok(Value::Null)),
                Some(StdArc::new(move |_args, _result| {
                    *flag_clone.lock().unwrap() = true;
                    Ok(())
                })),
            ))
            .unwrap();
        registry.invoke_and_record("create_file", Value::Null).unwrap();

        let outcome = service
            .rollback(ext.external_session_id, checkpoint.checkpoint_id, true, Some(&mut registry))
            .await
            .unwrap();

        assert_eq!(outcome.reverse_results.len(), 1);
        assert!(outcome.reverse_results[0].reversed_successfully);
        assert!(*flag.lock().unwrap());
    }
}
