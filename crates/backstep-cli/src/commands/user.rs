use anyhow::Context;
use backstep_core::session::SessionStorage;
use backstep_sdk::BackstepClient;

use crate::args::UserAction;

pub async fn handle(client: &BackstepClient, action: UserAction) -> anyhow::Result<()> {
    let store = client.store();

    match action {
        UserAction::Delete {
            acting_username,
            target_username,
        } => {
            let acting_user = store
                .get_user_by_username(&acting_username)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such user: {acting_username}"))?;

            store
                .delete_user(&acting_user, &target_username)
                .await
                .context("deleting user")?;

            println!("deleted user '{target_username}'");
        }
    }

    Ok(())
}
