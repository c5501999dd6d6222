use anyhow::Context;
use backstep_sdk::BackstepClient;

use crate::args::SessionAction;
use crate::commands::print_json;

pub async fn handle(client: &BackstepClient, action: SessionAction) -> anyhow::Result<()> {
    let store = client.store();

    match action {
        SessionAction::Create { username, display_name } => {
            let user = match backstep_core::session::SessionStorage::get_user_by_username(&*store, &username).await? {
                Some(user) => user,
                None => {
                    backstep_core::session::SessionStorage::create_user(&*store, &username, "unset")
                        .await
                        .context("creating user")?
                }
            };
            let session = backstep_core::session::SessionStorage::create_external_session(&*store, user.user_id, &display_name)
                .await
                .context("creating external session")?;
            print_json(&session)?;
        }
        SessionAction::List { username } => {
            let user = backstep_core::session::SessionStorage::get_user_by_username(&*store, &username)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such user: {username}"))?;
            let sessions = backstep_core::session::SessionStorage::list_external_sessions_by_user(&*store, user.user_id).await?;
            print_json(&sessions)?;
        }
        SessionAction::Show { external_session_id } => {
            let session = backstep_core::session::SessionStorage::get_external_session(&*store, external_session_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such external session: {external_session_id}"))?;
            let internal_sessions =
                backstep_core::session::SessionStorage::list_internal_sessions_by_external(&*store, external_session_id).await?;
            print_json(&serde_json::json!({
                "external_session": session,
                "internal_sessions": internal_sessions,
            }))?;
        }
    }

    Ok(())
}
