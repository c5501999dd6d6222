//! SQLite-backed realization of `backstep_core`'s `SessionStorage` and
//! `CheckpointStorage` traits.
//!
//! Default database path mirrors the reference implementation's
//! `data/rollback.db`: `data/backstep.db`, overridable via `EngineConfig`.

mod checkpoint_repository;
mod rows;
mod session_repository;

use std::path::Path;

use backstep_core::error::{EngineError, EngineResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::instrument;

/// Owns the connection pool shared by the session and checkpoint
/// repositories. Implements both `SessionStorage` and `CheckpointStorage`,
/// matching the engine's expectation that a single Store backs both.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to (creating if absent) the SQLite database at `path` and
    /// runs embedded migrations. Enables `PRAGMA foreign_keys = ON` so
    /// cascade deletes behave as specified.
    #[instrument(skip(path))]
    pub async fn connect(path: impl AsRef<Path>) -> EngineResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EngineError::storage(format!("failed to create database directory: {e}")))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| EngineError::storage(format!("connect error: {e}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| EngineError::storage(format!("migration failure: {e}")))?;

        Ok(Self { pool })
    }

    /// In-memory database, for tests and demos.
    pub async fn connect_in_memory() -> EngineResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| EngineError::storage(format!("connect error: {e}")))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| EngineError::storage(format!("migration failure: {e}")))?;
        Ok(Self { pool })
    }

    /// Ensures the bootstrap admin user (`rootusr`) exists. Idempotent.
    /// Mirrors the reference implementation's startup seeding; the caller
    /// supplies the initial credential hash rather than this crate
    /// hard-coding one.
    #[instrument(skip(self, credential_hash))]
    pub async fn initialize(&self, credential_hash: &str) -> EngineResult<()> {
        use backstep_core::model::ROOT_USERNAME;

        let existing = sqlx::query_scalar::<_, i64>("SELECT user_id FROM users WHERE username = ?")
            .bind(ROOT_USERNAME)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::storage(e.to_string()))?;

        if existing.is_some() {
            return Ok(());
        }

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (username, credential_hash, is_admin, created_at, updated_at)
             VALUES (?, ?, 1, ?, ?)",
        )
        .bind(ROOT_USERNAME)
        .bind(credential_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::storage(e.to_string()))?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
