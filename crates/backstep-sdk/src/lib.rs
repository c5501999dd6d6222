//! Backstep SDK
//!
//! High-level, programmatic facade over `backstep-core` (the engine) and
//! `backstep-store` (the SQLite-backed Store), for embedding the
//! checkpoint/rollback engine in an application without wiring the pieces
//! by hand.

pub mod client;
pub mod version;

pub use client::{BackstepClient, Session};

pub use backstep_core::agent::{EngineEvent, ModelClient, ModelResponse, Orchestrator, RunOutcome, ToolCall, ToolDescriptor};
pub use backstep_core::checkpoints::RollbackOutcome;
pub use backstep_core::error::{EngineError, EngineResult};
pub use backstep_core::model::{Checkpoint, ExternalSession, HistoryEntry, InternalSession, Role, User};
pub use backstep_core::tools::{ToolRegistry, ToolSpec};
pub use backstep_core::EngineConfig;
pub use backstep_store::SqliteStore;
