//! Client constructors.

use std::sync::Arc;

use backstep_core::{EngineConfig, EngineResult};
use backstep_store::SqliteStore;

use crate::client::BackstepClient;

impl BackstepClient {
    /// Connects to the SQLite database at `config.database_path`, running
    /// embedded migrations and seeding the bootstrap admin user
    /// (`ROOT_USERNAME`) with `root_credential_hash` if it does not already
    /// exist.
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
    pub async fn connect(config: EngineConfig, root_credential_hash: &str) -> EngineResult<Self> {
        let store = SqliteStore::connect(&config.database_path).await?;
        store.initialize(root_credential_hash).await?;
        Ok(Self {
            config,
            store: Arc::new(store),
            session_locks: Arc::new(tokio::sync::Mutex::new(std::collections::HashMap::new())),
        })
    }

    /// In-memory database, for tests and short-lived tooling. The database
    /// is discarded when the last clone of the returned client is dropped.
    pub async fn connect_in_memory(config: EngineConfig, root_credential_hash: &str) -> EngineResult<Self> {
        let store = SqliteStore::connect_in_memory().await?;
        store.initialize(root_credential_hash).await?;
        Ok(Self {
            config,
            store: Arc::new(store),
            session_locks: Arc::new(tokio::sync::Mutex::new(std::collections::HashMap::new())),
        })
    }
}
