//! Engine-wide configuration.

use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};

/// Options recognized at engine construction.
///
/// Built with the `with_*` consuming-builder pattern; `EngineConfig::default()`
/// provides the literal defaults documented alongside each field.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Enable automatic checkpointing after a turn that invoked a
    /// non-checkpoint tool.
    pub auto_checkpoint: bool,

    /// Cap used by `cleanup_auto_checkpoints` when the caller does not
    /// specify `keep_latest` explicitly.
    pub auto_prune_keep_latest: usize,

    /// Upper bound on how many history turns are passed to the model on a
    /// restored first call after a rollback.
    pub history_runs_injected: usize,

    pub model_endpoint: Option<String>,
    pub model_api_key: Option<String>,
    pub model_id: Option<String>,
    pub model_temperature: Option<f32>,

    /// Path to the SQLite database file backing the Store.
    pub database_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_checkpoint: true,
            auto_prune_keep_latest: 5,
            history_runs_injected: 20,
            model_endpoint: None,
            model_api_key: None,
            model_id: None,
            model_temperature: None,
            database_path: PathBuf::from("data/backstep.db"),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_checkpoint(mut self, enabled: bool) -> Self {
        self.auto_checkpoint = enabled;
        self
    }

    pub fn with_auto_prune_keep_latest(mut self, keep_latest: usize) -> Self {
        self.auto_prune_keep_latest = keep_latest.max(1);
        self
    }

    pub fn with_history_runs_injected(mut self, count: usize) -> Self {
        self.history_runs_injected = count;
        self
    }

    pub fn with_model_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.model_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_model_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.model_api_key = Some(api_key.into());
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_model_temperature(mut self, temperature: f32) -> Self {
        self.model_temperature = Some(temperature);
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Load overrides from environment variables prefixed `BACKSTEP_`, e.g.
    /// `BACKSTEP_DATABASE_PATH`, layered on top of [`EngineConfig::default`].
    pub fn from_env() -> EngineResult<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("BACKSTEP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::config(e.to_string()))?;

        let mut cfg = Self::default();
        if let Ok(v) = settings.get_bool("auto_checkpoint") {
            cfg.auto_checkpoint = v;
        }
        if let Ok(v) = settings.get_int("auto_prune_keep_latest") {
            cfg.auto_prune_keep_latest = (v.max(1)) as usize;
        }
        if let Ok(v) = settings.get_int("history_runs_injected") {
            cfg.history_runs_injected = v.max(0) as usize;
        }
        if let Ok(v) = settings.get_string("database_path") {
            cfg.database_path = PathBuf::from(v);
        }
        if let Ok(v) = settings.get_string("model_endpoint") {
            cfg.model_endpoint = Some(v);
        }
        if let Ok(v) = settings.get_string("model_api_key") {
            cfg.model_api_key = Some(v);
        }
        if let Ok(v) = settings.get_string("model_id") {
            cfg.model_id = Some(v);
        }
        Ok(cfg)
    }
}
