use backstep_core::checkpoints::CheckpointStorage;
use backstep_sdk::BackstepClient;

use crate::args::CheckpointAction;
use crate::commands::print_json;

/// Resolves a checkpoint query the same way the orchestrator's built-in
/// `rollback_to_checkpoint` tool does: try it as an id first, else search
/// manual (non-auto) checkpoints newest-first for a case-insensitive
/// substring match against the checkpoint's name.
async fn resolve_checkpoint_id(store: &backstep_store::SqliteStore, internal_session_id: i64, query: &str) -> anyhow::Result<i64> {
    if let Ok(id) = query.parse::<i64>() {
        return Ok(id);
    }

    let checkpoints = store.list_checkpoints(internal_session_id).await?;
    checkpoints
        .into_iter()
        .filter(|c| !c.is_auto)
        .find(|c| c.name_matches(query))
        .map(|c| c.checkpoint_id)
        .ok_or_else(|| anyhow::anyhow!("no checkpoint matching '{query}'"))
}

pub async fn handle(client: &BackstepClient, action: CheckpointAction) -> anyhow::Result<()> {
    let store = client.store();

    match action {
        CheckpointAction::List { internal_session_id } => {
            let checkpoints = store.list_checkpoints(internal_session_id).await?;
            print_json(&checkpoints)?;
        }
        CheckpointAction::Rollback {
            external_session_id,
            checkpoint_query,
            rollback_tools,
        } => {
            let session = backstep_core::session::SessionStorage::get_current_internal_session(&*store, external_session_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("external session {external_session_id} has no current internal session"))?;
            let checkpoint_id = resolve_checkpoint_id(&store, session.internal_session_id, &checkpoint_query).await?;

            let outcome = client.rollback(external_session_id, checkpoint_id, rollback_tools, None).await?;
            print_json(&serde_json::json!({
                "new_internal_session_id": outcome.new_internal_session.internal_session_id,
                "checkpoint_id": outcome.checkpoint.checkpoint_id,
                "lineage_copied": outcome.lineage_copied,
                "reverse_results": outcome.reverse_results,
            }))?;
        }
        CheckpointAction::Delete { checkpoint_id } => {
            store.delete_checkpoint(checkpoint_id).await?;
            println!("deleted checkpoint {checkpoint_id}");
        }
        CheckpointAction::Prune {
            internal_session_id,
            keep_latest,
        } => {
            let pruned = store.prune_auto_checkpoints(internal_session_id, keep_latest).await?;
            println!("pruned {pruned} automatic checkpoint(s), kept latest {keep_latest}");
        }
    }

    Ok(())
}
