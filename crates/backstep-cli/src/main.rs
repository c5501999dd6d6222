//! `backstep` — an admin/ops CLI over the checkpoint/rollback engine.
//!
//! Session and checkpoint management plus a reference `run` command. Not a
//! menu-driven chat front-end; embed `backstep-sdk` directly for that.

mod args;
mod commands;
mod echo_model;

use clap::Parser;

use args::{Cli, Commands};
use backstep_core::EngineConfig;
use backstep_sdk::BackstepClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env().unwrap_or_default();
    if let Some(path) = cli.database_path {
        config = config.with_database_path(path);
    }

    match cli.command {
        Commands::Config => {
            commands::config::handle(&config)?;
        }
        other => {
            let client = BackstepClient::connect(config, "unset").await?;
            match other {
                Commands::Session { action } => commands::session::handle(&client, action).await?,
                Commands::Checkpoint { action } => commands::checkpoint::handle(&client, action).await?,
                Commands::User { action } => commands::user::handle(&client, action).await?,
                Commands::Run {
                    username,
                    external_session_id,
                    message,
                } => commands::run::handle(&client, username, external_session_id, message).await?,
                Commands::Config => unreachable!(),
            }
        }
    }

    Ok(())
}
