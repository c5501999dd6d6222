//! Exercises a full checkpoint/rollback cycle against an in-memory Store:
//! register a reversible tool, invoke it, checkpoint, invoke the tool
//! again, then roll back to the first checkpoint and confirm the second
//! invocation's effect was undone.
//!
//! Run with `cargo run --example checkpoint_rollback_demo -p backstep-sdk`.

use std::sync::{Arc, Mutex};

use backstep_core::checkpoints::{CheckpointService, CheckpointStorage};
use backstep_core::session::{SessionManager, SessionStorage};
use backstep_core::tools::{ToolRegistry, ToolSpec};
use backstep_sdk::SqliteStore;
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(SqliteStore::connect_in_memory().await?);
    let user = store.create_user("demo", "unset").await?;
    let external = store.create_external_session(user.user_id, "demo conversation").await?;

    let session_manager = SessionManager::new(
        store.clone() as Arc<dyn SessionStorage>,
        store.clone() as Arc<dyn CheckpointStorage>,
    );
    let internal = session_manager.new_internal_session(external.external_session_id).await?;

    let created_files: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let forward_files = created_files.clone();
    let reverse_files = created_files.clone();

    let mut registry = ToolRegistry::default();
    registry.register(ToolSpec::new(
        "create_file",
        Arc::new(move |args: &Value| {
            let path = args["path"].as_str().unwrap().to_string();
            forward_files.lock().unwrap().push(path.clone());
            Ok(json!({ "path": path }))
        }),
        Some(Arc::new(move |args: &Value, _result: &Value| {
            let path = args["path"].as_str().unwrap();
            reverse_files.lock().unwrap().retain(|p| p != path);
            Ok(())
        })),
    ))?;

    registry.invoke_and_record("create_file", json!({ "path": "a.txt" }))?;
    println!("after first create: {:?}", created_files.lock().unwrap());

    let checkpoint = session_manager
        .snapshot(internal.internal_session_id, Some("after-a".to_string()), false, registry.track_len())
        .await?;

    registry.invoke_and_record("create_file", json!({ "path": "b.txt" }))?;
    println!("after second create: {:?}", created_files.lock().unwrap());

    let service = CheckpointService::new(
        store.clone() as Arc<dyn SessionStorage>,
        store.clone() as Arc<dyn CheckpointStorage>,
    );
    let outcome = service
        .rollback(external.external_session_id, checkpoint.checkpoint_id, true, Some(&mut registry))
        .await?;

    println!("after rollback: {:?}", created_files.lock().unwrap());
    println!(
        "forked into internal session {} (track length now {})",
        outcome.new_internal_session.internal_session_id,
        registry.track_len()
    );

    Ok(())
}
