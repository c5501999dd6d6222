use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{instrument, warn};

use crate::checkpoints::CheckpointStorage;
use crate::error::{EngineError, EngineResult};
use crate::model::{HistoryEntry, InternalSession, Role};
use crate::session::SessionManager;
use crate::tools::{is_checkpoint_tool, ToolInvocationRecord, ToolRegistry};

use super::builtin_tools::checkpoint_tool_descriptors;
use super::model_client::{ModelClient, ToolCall, ToolDescriptor};

/// Caller-visible events, also logged via `tracing` at the same call sites.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    RollbackRequested { checkpoint_id: i64 },
    CheckpointCreated { checkpoint_id: i64, is_auto: bool },
    ToolReversed { tool_name: String, success: bool, error: Option<String> },
}

/// What the caller needs to know after one `run()` call.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub assistant_text: String,
    /// Set when the built-in `rollback_to_checkpoint` tool ran this turn.
    /// The orchestrator does not act on this itself — the caller must hand
    /// it to the Checkpoint Service and then discard this orchestrator.
    pub rollback_requested_checkpoint_id: Option<i64>,
    pub auto_checkpoint_id: Option<i64>,
}

/// Wraps a [`ModelClient`], routes tool calls through the [`ToolRegistry`]
/// track, auto-checkpoints, and surfaces rollback requests without acting on
/// them (see the module-level Design Notes on the built-in tools side
/// channel).
pub struct Orchestrator {
    external_session_id: i64,
    internal_session_id: i64,
    model: Arc<dyn ModelClient>,
    registry: Mutex<ToolRegistry>,
    session_manager: SessionManager,
    checkpoints: Arc<dyn CheckpointStorage>,
    auto_checkpoint: bool,
    auto_prune_keep_latest: usize,
    history_runs_injected: usize,
    /// Set on construction from a checkpoint; cleared after the first
    /// `run()` consumes it.
    pending_history_injection: Option<Vec<HistoryEntry>>,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl Orchestrator {
    /// Fresh construction: no restored history to inject.
    pub fn new(
        external_session_id: i64,
        internal_session_id: i64,
        model: Arc<dyn ModelClient>,
        session_manager: SessionManager,
        checkpoints: Arc<dyn CheckpointStorage>,
        registry: ToolRegistry,
        auto_checkpoint: bool,
        auto_prune_keep_latest: usize,
        history_runs_injected: usize,
    ) -> Self {
        Self {
            external_session_id,
            internal_session_id,
            model,
            registry: Mutex::new(registry),
            session_manager,
            checkpoints,
            auto_checkpoint,
            auto_prune_keep_latest,
            history_runs_injected,
            pending_history_injection: None,
            events: None,
        }
    }

    /// Construction from a checkpoint (post-rollback): the checkpoint's
    /// conversation history is held for one-shot re-injection on the first
    /// subsequent `run`.
    pub fn from_checkpoint_history(mut self, history: Vec<HistoryEntry>) -> Self {
        let capped = if history.len() > self.history_runs_injected {
            history[history.len() - self.history_runs_injected..].to_vec()
        } else {
            history
        };
        self.pending_history_injection = Some(capped);
        self
    }

    pub fn with_event_channel(mut self, sender: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn tool_descriptors(&self, registry: &ToolRegistry) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = registry
            .tool_names()
            .into_iter()
            .filter(|name| !is_checkpoint_tool(name))
            .map(|name| ToolDescriptor {
                name,
                description: String::new(),
                parameters: json!({ "type": "object", "properties": {} }),
            })
            .collect();
        descriptors.extend(checkpoint_tool_descriptors());
        descriptors
    }

    /// §4.4 Run contract.
    #[instrument(skip(self, user_utterance))]
    pub async fn run(&mut self, user_utterance: &str) -> EngineResult<RunOutcome> {
        // Step 1: append the user turn.
        self.session_manager
            .append_turn(self.internal_session_id, Role::User, user_utterance)
            .await?;

        // Step 2: one-shot history re-injection.
        let injected_history = self.pending_history_injection.take();

        let track_len_before_turn = self.registry.lock().await.track_len();

        // Step 3: invoke the model; route any tool calls through the hook.
        let descriptors = self.tool_descriptors(&*self.registry.lock().await);
        let response = self
            .model
            .run(user_utterance, injected_history.as_deref(), &descriptors)
            .await?;

        let mut rollback_requested_checkpoint_id = None;
        for call in &response.tool_calls {
            let outcome = self.execute_tool_call(call).await;
            if call.name == "rollback_to_checkpoint" {
                if let Ok(Value::Object(map)) = &outcome {
                    if let Some(id) = map.get("checkpoint_id").and_then(Value::as_i64) {
                        rollback_requested_checkpoint_id = Some(id);
                    }
                }
            }
            if let Err(e) = outcome {
                warn!(tool = %call.name, error = %e, "tool invocation failed");
            }
        }

        // Step 4: append the assistant turn.
        self.session_manager
            .append_turn(self.internal_session_id, Role::Assistant, &response.text)
            .await?;

        // Step 5: persistence already happened incrementally via
        // `session_manager.append_turn` / tool recording above.

        // Step 6: conditional auto-checkpoint.
        let any_tool_fired = !response.tool_calls.is_empty();
        let last_tool_is_checkpoint_tool = response
            .tool_calls
            .last()
            .map(|c| is_checkpoint_tool(&c.name))
            .unwrap_or(false);

        let auto_checkpoint_id = if self.auto_checkpoint && any_tool_fired && !last_tool_is_checkpoint_tool {
            let tool_name = response
                .tool_calls
                .last()
                .map(|c| c.name.clone())
                .unwrap_or_default();
            match self
                .session_manager
                .snapshot(
                    self.internal_session_id,
                    Some(format!("After {tool_name}")),
                    true,
                    track_len_before_turn,
                )
                .await
            {
                Ok(checkpoint) => {
                    self.emit(EngineEvent::CheckpointCreated {
                        checkpoint_id: checkpoint.checkpoint_id,
                        is_auto: true,
                    });
                    if let Err(e) = self
                        .checkpoints
                        .prune_auto_checkpoints(self.internal_session_id, self.auto_prune_keep_latest)
                        .await
                    {
                        warn!(error = %e, "auto-checkpoint pruning failed");
                    }
                    Some(checkpoint.checkpoint_id)
                }
                Err(e) => {
                    // Auto-checkpoint failures are logged but never fail the
                    // enclosing run.
                    warn!(error = %e, "auto-checkpoint creation failed");
                    None
                }
            }
        } else {
            None
        };

        // Step 7: surface (never act on) a rollback request.
        if let Some(id) = rollback_requested_checkpoint_id {
            self.emit(EngineEvent::RollbackRequested { checkpoint_id: id });
        }

        Ok(RunOutcome {
            assistant_text: response.text,
            rollback_requested_checkpoint_id,
            auto_checkpoint_id,
        })
    }

    /// §4.4.1 Tool-invocation hook. Idempotent relative to retries: a model
    /// that retries a tool produces two Track records in order.
    async fn execute_tool_call(&self, call: &ToolCall) -> EngineResult<Value> {
        if is_checkpoint_tool(&call.name) {
            return self.execute_builtin_tool(call).await;
        }

        let mut registry = self.registry.lock().await;
        registry.invoke_and_record(&call.name, call.args.clone())
    }

    async fn execute_builtin_tool(&self, call: &ToolCall) -> EngineResult<Value> {
        let result = match call.name.as_str() {
            "create_checkpoint" => {
                let name = call.args.get("name").and_then(Value::as_str).map(str::to_string);
                let track_index = self.registry.lock().await.track_len();
                let checkpoint = self
                    .session_manager
                    .snapshot(self.internal_session_id, name, false, track_index)
                    .await?;
                self.emit(EngineEvent::CheckpointCreated {
                    checkpoint_id: checkpoint.checkpoint_id,
                    is_auto: false,
                });
                json!({ "checkpoint_id": checkpoint.checkpoint_id })
            }
            "list_checkpoints" => {
                let checkpoints = self.checkpoints.list_checkpoints(self.internal_session_id).await?;
                json!({
                    "checkpoints": checkpoints.iter().map(|c| json!({
                        "checkpoint_id": c.checkpoint_id,
                        "name": c.name,
                        "is_auto": c.is_auto,
                        "created_at": c.created_at.to_rfc3339(),
                    })).collect::<Vec<_>>()
                })
            }
            "rollback_to_checkpoint" => {
                let query = call
                    .args
                    .get("id_or_name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| EngineError::invalid_state_transition("rollback_to_checkpoint requires id_or_name"))?;

                let checkpoint_id = self.resolve_checkpoint_query(query).await?;

                self.session_manager
                    .set_state(self.internal_session_id, "rollback_requested", Value::Bool(true))
                    .await?;
                self.session_manager
                    .set_state(
                        self.internal_session_id,
                        "rollback_checkpoint_id",
                        Value::from(checkpoint_id),
                    )
                    .await?;

                json!({ "checkpoint_id": checkpoint_id })
            }
            "delete_checkpoint" => {
                let checkpoint_id = call
                    .args
                    .get("checkpoint_id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| EngineError::invalid_state_transition("delete_checkpoint requires checkpoint_id"))?;
                let checkpoint = self
                    .checkpoints
                    .get_checkpoint(checkpoint_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(format!("checkpoint {checkpoint_id}")))?;
                if checkpoint.owning_internal_session_id != self.internal_session_id {
                    return Err(EngineError::invalid_state_transition(
                        "checkpoint does not belong to the current internal session",
                    ));
                }
                self.checkpoints.delete_checkpoint(checkpoint_id).await?;
                json!({ "deleted": checkpoint_id })
            }
            "get_checkpoint_info" => {
                let checkpoint_id = call
                    .args
                    .get("checkpoint_id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| EngineError::invalid_state_transition("get_checkpoint_info requires checkpoint_id"))?;
                let checkpoint = self
                    .checkpoints
                    .get_checkpoint(checkpoint_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(format!("checkpoint {checkpoint_id}")))?;
                json!({
                    "checkpoint_id": checkpoint.checkpoint_id,
                    "name": checkpoint.name,
                    "is_auto": checkpoint.is_auto,
                    "tool_track_position": checkpoint.tool_track_position(),
                    "created_at": checkpoint.created_at.to_rfc3339(),
                })
            }
            "cleanup_auto_checkpoints" => {
                let keep_latest = call
                    .args
                    .get("keep_latest")
                    .and_then(Value::as_u64)
                    .unwrap_or(5) as usize;
                let pruned = self
                    .checkpoints
                    .prune_auto_checkpoints(self.internal_session_id, keep_latest)
                    .await?;
                json!({ "pruned": pruned })
            }
            other => {
                return Err(EngineError::not_found(format!("built-in tool '{other}'")));
            }
        };

        let mut registry = self.registry.lock().await;
        registry.record(ToolInvocationRecord::success(&call.name, call.args.clone(), result.clone()));
        Ok(result)
    }

    /// Resolves `rollback_to_checkpoint`'s `id_or_name`: a plain integer is
    /// treated as a checkpoint id; otherwise, case-insensitive substring
    /// match against manual checkpoint names in the current internal
    /// session, newest-first, first match wins.
    async fn resolve_checkpoint_query(&self, query: &str) -> EngineResult<i64> {
        if let Ok(id) = query.parse::<i64>() {
            return Ok(id);
        }

        let checkpoints = self.checkpoints.list_checkpoints(self.internal_session_id).await?;
        checkpoints
            .iter()
            .filter(|c| !c.is_auto)
            .find(|c| c.name_matches(query))
            .map(|c| c.checkpoint_id)
            .ok_or_else(|| EngineError::not_found(format!("checkpoint matching '{query}'")))
    }

    pub fn internal_session_id(&self) -> i64 {
        self.internal_session_id
    }

    pub fn external_session_id(&self) -> i64 {
        self.external_session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelResponse};
    use crate::checkpoints::CheckpointStorage;
    use crate::model::{Checkpoint, ExternalSession, User};
    use crate::session::SessionStorage;
    use crate::tools::ToolSpec;
    use async_trait::async_trait;
    use parking_lot::Mutex as PLMutex;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryStore {
        users: PLMutex<HashMap<i64, User>>,
        externals: PLMutex<HashMap<i64, ExternalSession>>,
        internals: PLMutex<HashMap<i64, InternalSession>>,
        checkpoints: PLMutex<HashMap<i64, Checkpoint>>,
        next_id: PLMutex<i64>,
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
            Ok(self.externals.lock().values().filter(|s| s.owner_user_id == owner_user_id).cloned().collect())
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
            Ok(self.internals.lock().values().filter(|s| s.parent_external_session_id == external_session_id).cloned().collect())
        }
        async fn get_current_internal_session(&self, external_session_id: i64) -> EngineResult<Option<InternalSession>> {
            Ok(self.internals.lock().values().find(|s| s.parent_external_session_id == external_session_id && s.is_current).cloned())
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
            let mut v: Vec<_> = self.checkpoints.lock().values().filter(|c| c.owning_internal_session_id == internal_session_id).cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
        async fn list_auto_checkpoints(&self, internal_session_id: i64) -> EngineResult<Vec<Checkpoint>> {
            Ok(self.list_checkpoints(internal_session_id).await?.into_iter().filter(|c| c.is_auto).collect())
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

    struct ScriptedModel {
        responses: StdMutex<Vec<ModelResponse>>,
        observed_history_lens: StdMutex<Vec<Option<usize>>>,
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn run(&self, _message: &str, history: Option<&[HistoryEntry]>, _tools: &[ToolDescriptor]) -> EngineResult<ModelResponse> {
            self.observed_history_lens.lock().unwrap().push(history.map(<[HistoryEntry]>::len));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(ModelResponse::default());
            }
            Ok(responses.remove(0))
        }
    }

    fn create_file_spec(created: Arc<PLMutex<Vec<String>>>) -> ToolSpec {
        let fwd_created = created.clone();
        let rev_created = created;
        ToolSpec::new(
            "create_file",
            Arc::new(move |args: &Value| {
                let path = args.get("path").and_then(Value::as_str).unwrap_or_default().to_string();
                fwd_created.lock().push(path.clone());
                Ok(json!({ "path": path }))
            }),
            Some(Arc::new(move |args: &Value, _result: &Value| {
                let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
                rev_created.lock().retain(|p| p != path);
                Ok(())
            })),
        )
    }

    #[tokio::test]
    async fn auto_checkpoint_fires_only_after_non_checkpoint_tool() {
        let store = Arc::new(InMemoryStore::default());
        let ext = store.create_external_session(1, "conversation").await.unwrap();
        let session = store.create_internal_session(ext.external_session_id).await.unwrap();

        let created_files = Arc::new(PLMutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(create_file_spec(created_files.clone())).unwrap();

        let model = Arc::new(ScriptedModel {
            responses: StdMutex::new(vec![ModelResponse {
                text: "created it".to_string(),
                tool_calls: vec![ToolCall { name: "create_file".to_string(), args: json!({ "path": "t.txt" }) }],
            }]),
            observed_history_lens: StdMutex::new(Vec::new()),
        });

        let session_manager = SessionManager::new(store.clone(), store.clone());
        let mut orchestrator = Orchestrator::new(
            ext.external_session_id,
            session.internal_session_id,
            model,
            session_manager,
            store.clone(),
            registry,
            true,
            5,
            20,
        );

        let before = store.list_auto_checkpoints(session.internal_session_id).await.unwrap().len();
        orchestrator.run("please create t.txt").await.unwrap();
        let after = store.list_auto_checkpoints(session.internal_session_id).await.unwrap().len();
        assert_eq!(after - before, 1);
        assert_eq!(created_files.lock().as_slice(), &["t.txt".to_string()]);
    }

    #[tokio::test]
    async fn checkpoint_history_is_injected_once_then_cleared() {
        let store = Arc::new(InMemoryStore::default());
        let ext = store.create_external_session(1, "conversation").await.unwrap();
        let session = store.create_internal_session(ext.external_session_id).await.unwrap();

        let model = Arc::new(ScriptedModel {
            responses: StdMutex::new(vec![ModelResponse::default(), ModelResponse::default()]),
            observed_history_lens: StdMutex::new(Vec::new()),
        });

        let session_manager = SessionManager::new(store.clone(), store.clone());
        let history = vec![HistoryEntry::new(Role::User, "earlier turn".to_string())];
        let mut orchestrator = Orchestrator::new(
            ext.external_session_id,
            session.internal_session_id,
            model.clone(),
            session_manager,
            store.clone(),
            ToolRegistry::new(),
            true,
            5,
            20,
        )
        .from_checkpoint_history(history);

        orchestrator.run("first turn after rollback").await.unwrap();
        orchestrator.run("second turn").await.unwrap();

        let observed = model.observed_history_lens.lock().unwrap().clone();
        assert_eq!(observed, vec![Some(1), None]);
    }
}
