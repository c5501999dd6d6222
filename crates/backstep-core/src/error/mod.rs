//! Unified error type for the checkpoint/rollback engine.

mod constructors;
mod types;

pub use types::EngineError;

/// Convenience alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
