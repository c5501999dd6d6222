use backstep_core::EngineConfig;

pub fn handle(config: &EngineConfig) -> anyhow::Result<()> {
    println!("database_path:         {}", config.database_path.display());
    println!("auto_checkpoint:       {}", config.auto_checkpoint);
    println!("auto_prune_keep_latest: {}", config.auto_prune_keep_latest);
    println!("history_runs_injected: {}", config.history_runs_injected);
    println!("model_id:              {}", config.model_id.as_deref().unwrap_or("(unset)"));
    println!("model_endpoint:        {}", config.model_endpoint.as_deref().unwrap_or("(unset)"));
    Ok(())
}
