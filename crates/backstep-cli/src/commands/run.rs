use std::sync::Arc;

use backstep_core::session::SessionStorage;
use backstep_core::tools::ToolRegistry;
use backstep_sdk::BackstepClient;

use crate::commands::print_json;
use crate::echo_model::EchoModelClient;

pub async fn handle(client: &BackstepClient, username: String, external_session_id: Option<i64>, message: String) -> anyhow::Result<()> {
    let store = client.store();

    let user = match store.get_user_by_username(&username).await? {
        Some(user) => user,
        None => store.create_user(&username, "unset").await?,
    };

    let external_session_id = match external_session_id {
        Some(id) => id,
        None => {
            let session = store.create_external_session(user.user_id, "cli").await?;
            session.external_session_id
        }
    };

    let model = Arc::new(EchoModelClient);
    let mut session = client.open_session(external_session_id, model, ToolRegistry::default()).await?;

    let outcome = session.run(&message).await?;

    print_json(&serde_json::json!({
        "external_session_id": external_session_id,
        "internal_session_id": session.internal_session_id(),
        "assistant_text": outcome.assistant_text,
        "rollback_requested_checkpoint_id": outcome.rollback_requested_checkpoint_id,
        "auto_checkpoint_id": outcome.auto_checkpoint_id,
    }))?;

    Ok(())
}
