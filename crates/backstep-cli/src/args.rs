//! CLI argument definitions.
//!
//! This front-end is intentionally a thin admin/ops surface over the
//! engine — session and checkpoint management plus a reference `run`
//! command exercising the Agent Orchestrator with a minimal echo model.
//! It does not attempt an interactive menu-driven chat UI.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "backstep")]
#[command(about = "Checkpoint-and-rollback engine for tool-using conversational agents")]
#[command(version)]
pub struct Cli {
    /// Path to the SQLite database file (overrides BACKSTEP_DATABASE_PATH
    /// and the built-in default).
    #[arg(long, global = true)]
    pub database_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, list, and resume external/internal sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Create, list, and roll back to checkpoints.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Admin-only user management.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Run one turn against an echo model client, for exercising the
    /// engine end to end without a real LLM integration.
    Run {
        /// Owning user's username (created if absent).
        #[arg(long)]
        username: String,
        /// External session to run in; a new one is created if omitted.
        #[arg(long)]
        external_session_id: Option<i64>,
        /// The message to send.
        message: String,
    },
    /// Show the resolved engine configuration.
    Config,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a user and their first external session.
    Create {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "default")]
        display_name: String,
    },
    /// List external sessions owned by a user.
    List {
        #[arg(long)]
        username: String,
    },
    /// Show one external session and its internal sessions.
    Show {
        external_session_id: i64,
    },
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Delete a user. Only an admin may do this, and the root user can
    /// never be deleted.
    Delete {
        /// Username of the admin performing the deletion.
        #[arg(long)]
        acting_username: String,
        target_username: String,
    },
}

#[derive(Subcommand)]
pub enum CheckpointAction {
    /// List checkpoints for an internal session, newest first.
    List {
        internal_session_id: i64,
    },
    /// Roll back an external session to a checkpoint, by id or
    /// case-insensitive substring of a manual checkpoint's name.
    Rollback {
        external_session_id: i64,
        checkpoint_query: String,
        /// Also reverse tool invocations above the checkpoint's Track
        /// position (requires the session to still hold a live registry;
        /// absent here, so this flag only truncates Store-side history).
        #[arg(long)]
        rollback_tools: bool,
    },
    /// Delete a checkpoint by id.
    Delete {
        checkpoint_id: i64,
    },
    /// Prune automatic checkpoints, keeping the N most recent.
    Prune {
        internal_session_id: i64,
        #[arg(long, default_value_t = 5)]
        keep_latest: usize,
    },
}
