//! Checkpoint Service (rollback driver): reverses tools above a saved
//! track index, then forks a new internal session seeded from the
//! checkpoint snapshot.

mod service;
mod storage;

pub use service::{CheckpointService, RollbackOutcome};
pub use storage::CheckpointStorage;
