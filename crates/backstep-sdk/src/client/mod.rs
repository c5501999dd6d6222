//! SDK client implementation.

mod builder;
mod session;

pub use session::Session;

use std::sync::Arc;

use backstep_core::checkpoints::{CheckpointService, CheckpointStorage, RollbackOutcome};
use backstep_core::session::SessionManager;
use backstep_core::tools::ToolRegistry;
use backstep_core::{EngineConfig, EngineResult};
use backstep_store::SqliteStore;

/// High-level client for embedding the checkpoint/rollback engine.
///
/// `BackstepClient` owns the `Store` connection and configuration; it hands
/// out [`Session`] handles that pair an `Orchestrator` with the caller's
/// `ModelClient`, and exposes rollback directly for callers that service a
/// `rollback_requested` flag surfaced by a prior [`Session::run`].
///
/// # Examples
///
/// ```no_run
/// use backstep_sdk::{BackstepClient, EngineConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = BackstepClient::connect(EngineConfig::default(), "hashed-password").await?;
/// # Ok(())
/// # }
/// ```
pub struct BackstepClient {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<SqliteStore>,
    /// One lock per external session, so that concurrent `Session::run`
    /// attempts on the same external session serialize instead of racing
    /// over its Track and current-internal-session pointer. `try_lock`
    /// contention surfaces as `EngineError::Busy` rather than blocking.
    pub(crate) session_locks: Arc<tokio::sync::Mutex<std::collections::HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl BackstepClient {
    /// Returns the lock guarding `external_session_id`, creating one on
    /// first use.
    pub(crate) async fn lock_for(&self, external_session_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(external_session_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Current engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared handle to the underlying Store, for callers that need direct
    /// access to session or checkpoint storage.
    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }

    fn session_manager(&self) -> SessionManager {
        SessionManager::new(self.store.clone() as Arc<dyn backstep_core::session::SessionStorage>, self.checkpoint_storage())
    }

    fn checkpoint_storage(&self) -> Arc<dyn CheckpointStorage> {
        self.store.clone() as Arc<dyn CheckpointStorage>
    }

    /// Executes the rollback state transition for `external_session_id`
    /// against the checkpoint matched by `checkpoint_query` (an id or a
    /// case-insensitive substring of a manual checkpoint's name).
    ///
    /// Pass the live `ToolRegistry` for the session being rolled back (the
    /// same instance that recorded the Track) when `rollback_tools` is
    /// `true`; its reverse handlers run, and its Track is truncated to the
    /// checkpoint's recorded position.
    pub async fn rollback(
        &self,
        external_session_id: i64,
        checkpoint_id: i64,
        rollback_tools: bool,
        registry: Option<&mut ToolRegistry>,
    ) -> EngineResult<RollbackOutcome> {
        let service = CheckpointService::new(
            self.store.clone() as Arc<dyn backstep_core::session::SessionStorage>,
            self.checkpoint_storage(),
        );
        service
            .rollback(external_session_id, checkpoint_id, rollback_tools, registry)
            .await
    }
}
