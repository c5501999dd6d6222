//! Session facade: pairs an `Orchestrator` with the session lifecycle calls
//! needed to open, resume, or fork one.

use std::sync::Arc;

use backstep_core::agent::{ModelClient, Orchestrator, RunOutcome};
use backstep_core::error::{EngineError, EngineResult};
use backstep_core::model::HistoryEntry;
use backstep_core::tools::ToolRegistry;
use tokio::sync::Mutex;

use super::BackstepClient;

/// A live conversation turn loop: one `Orchestrator` bound to a specific
/// internal session.
///
/// Dropping a `Session` after a rollback request is the caller's
/// responsibility — per the engine's design, the orchestrator that surfaced
/// `rollback_requested_checkpoint_id` must not be reused; open a fresh
/// [`Session`] against the internal session [`BackstepClient::rollback`]
/// forks.
pub struct Session {
    orchestrator: Orchestrator,
    /// Per-external-session lock shared with `BackstepClient`. `run()`
    /// `try_lock`s this rather than awaiting it, so a concurrent `run()` on
    /// the same external session fails fast with `EngineError::Busy`
    /// instead of queueing behind the first.
    session_lock: Arc<Mutex<()>>,
}

impl Session {
    /// Runs one turn: sends `user_utterance` to the model, executes any
    /// tool calls it returns (including the built-in checkpoint tools),
    /// auto-checkpoints if configured, and returns the assistant's text
    /// plus any rollback request the caller must service.
    ///
    /// Returns `EngineError::Busy` if another `run()` on the same external
    /// session is already in flight.
    pub async fn run(&mut self, user_utterance: &str) -> EngineResult<RunOutcome> {
        let _guard = self.session_lock.try_lock().map_err(|_| EngineError::busy())?;
        self.orchestrator.run(user_utterance).await
    }

    pub fn internal_session_id(&self) -> i64 {
        self.orchestrator.internal_session_id()
    }

    pub fn external_session_id(&self) -> i64 {
        self.orchestrator.external_session_id()
    }
}

impl BackstepClient {
    /// Opens a brand-new internal session under `external_session_id` and
    /// wraps it in an `Orchestrator` bound to `model` and `tools`.
    pub async fn open_session(
        &self,
        external_session_id: i64,
        model: Arc<dyn ModelClient>,
        tools: ToolRegistry,
    ) -> EngineResult<Session> {
        let session_manager = self.session_manager();
        let session = session_manager.new_internal_session(external_session_id).await?;
        let session_lock = self.lock_for(external_session_id).await;

        let orchestrator = Orchestrator::new(
            external_session_id,
            session.internal_session_id,
            model,
            session_manager,
            self.checkpoint_storage(),
            tools,
            self.config.auto_checkpoint,
            self.config.auto_prune_keep_latest,
            self.config.history_runs_injected,
        );

        Ok(Session { orchestrator, session_lock })
    }

    /// Resumes the current internal session of `external_session_id` (or a
    /// specific `internal_session_id` within it), rejecting any id that
    /// does not belong to that external session.
    pub async fn resume_session(
        &self,
        external_session_id: i64,
        internal_session_id: Option<i64>,
        model: Arc<dyn ModelClient>,
        tools: ToolRegistry,
    ) -> EngineResult<Session> {
        let session_manager = self.session_manager();
        let session = session_manager.resume(external_session_id, internal_session_id).await?;
        let session_lock = self.lock_for(external_session_id).await;

        let orchestrator = Orchestrator::new(
            external_session_id,
            session.internal_session_id,
            model,
            session_manager,
            self.checkpoint_storage(),
            tools,
            self.config.auto_checkpoint,
            self.config.auto_prune_keep_latest,
            self.config.history_runs_injected,
        );

        Ok(Session { orchestrator, session_lock })
    }

    /// Wraps an internal session already forked by [`BackstepClient::rollback`]
    /// in a fresh `Orchestrator`, re-injecting the forked session's
    /// conversation history (capped to `history_runs_injected`) on the first
    /// `run()` call.
    pub async fn session_from_rollback(
        &self,
        external_session_id: i64,
        internal_session_id: i64,
        history: Vec<HistoryEntry>,
        model: Arc<dyn ModelClient>,
        tools: ToolRegistry,
    ) -> Session {
        let session_lock = self.lock_for(external_session_id).await;
        let orchestrator = Orchestrator::new(
            external_session_id,
            internal_session_id,
            model,
            self.session_manager(),
            self.checkpoint_storage(),
            tools,
            self.config.auto_checkpoint,
            self.config.auto_prune_keep_latest,
            self.config.history_runs_injected,
        )
        .from_checkpoint_history(history);

        Session { orchestrator, session_lock }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backstep_core::agent::{ModelResponse, ToolDescriptor};
    use backstep_core::session::SessionStorage;
    use backstep_core::EngineConfig;

    struct SilentModel;

    #[async_trait]
    impl ModelClient for SilentModel {
        async fn run(&self, _message: &str, _history: Option<&[HistoryEntry]>, _tools: &[ToolDescriptor]) -> EngineResult<ModelResponse> {
            Ok(ModelResponse::default())
        }
    }

    #[tokio::test]
    async fn concurrent_run_on_same_external_session_returns_busy() {
        let client = BackstepClient::connect_in_memory(EngineConfig::default(), "unset").await.unwrap();
        let store = client.store();
        let user = store.create_user("alice", "hash").await.unwrap();
        let external = store.create_external_session(user.user_id, "conversation").await.unwrap();

        let mut session = client
            .open_session(external.external_session_id, Arc::new(SilentModel), ToolRegistry::default())
            .await
            .unwrap();

        // Simulate another `run()` already in flight on the same external session.
        let lock = client.lock_for(external.external_session_id).await;
        let _held = lock.try_lock().unwrap();

        let result = session.run("hello").await;
        assert!(matches!(result, Err(EngineError::Busy)));
    }

    #[tokio::test]
    async fn run_succeeds_once_the_lock_is_released() {
        let client = BackstepClient::connect_in_memory(EngineConfig::default(), "unset").await.unwrap();
        let store = client.store();
        let user = store.create_user("alice", "hash").await.unwrap();
        let external = store.create_external_session(user.user_id, "conversation").await.unwrap();

        let mut session = client
            .open_session(external.external_session_id, Arc::new(SilentModel), ToolRegistry::default())
            .await
            .unwrap();

        assert!(session.run("hello").await.is_ok());
    }
}
