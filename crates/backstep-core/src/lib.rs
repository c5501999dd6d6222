//! Checkpoint-and-rollback engine for tool-using conversational agents.
//!
//! An [`agent::Orchestrator`] wraps a [`agent::ModelClient`], routes tool
//! calls through a [`tools::ToolRegistry`] track, and hands off to the
//! [`checkpoints::CheckpointService`] whenever a rollback is requested. The
//! [`session::SessionManager`] owns the hierarchical
//! user / external-session / internal-session / checkpoint model described
//! in [`model`].

pub mod agent;
pub mod checkpoints;
pub mod config;
pub mod error;
pub mod model;
pub mod session;
pub mod tools;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
