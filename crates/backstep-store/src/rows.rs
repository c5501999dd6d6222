//! Row <-> domain-model conversions. JSON-encoded columns (`session_state`,
//! `conversation_history`, `metadata`) round-trip through `serde_json`.

use std::collections::HashMap;

use backstep_core::error::{EngineError, EngineResult};
use backstep_core::model::{Checkpoint, ExternalSession, HistoryEntry, InternalSession, User};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn parse_timestamp(raw: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::storage(format!("invalid timestamp '{raw}': {e}")))
}

pub fn user_from_row(row: &SqliteRow) -> EngineResult<User> {
    Ok(User {
        user_id: row.try_get("user_id").map_err(|e| EngineError::storage(e.to_string()))?,
        username: row.try_get("username").map_err(|e| EngineError::storage(e.to_string()))?,
        credential_hash: row
            .try_get("credential_hash")
            .map_err(|e| EngineError::storage(e.to_string()))?,
        is_admin: row.try_get::<i64, _>("is_admin").map_err(|e| EngineError::storage(e.to_string()))? != 0,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(|e| EngineError::storage(e.to_string()))?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at").map_err(|e| EngineError::storage(e.to_string()))?)?,
    })
}

pub fn external_session_from_row(row: &SqliteRow, internal_session_ids: Vec<i64>) -> EngineResult<ExternalSession> {
    let current: Option<i64> = row
        .try_get("current_internal_session_id")
        .map_err(|e| EngineError::storage(e.to_string()))?;
    Ok(ExternalSession {
        external_session_id: row
            .try_get("external_session_id")
            .map_err(|e| EngineError::storage(e.to_string()))?,
        owner_user_id: row.try_get("owner_user_id").map_err(|e| EngineError::storage(e.to_string()))?,
        display_name: row.try_get("display_name").map_err(|e| EngineError::storage(e.to_string()))?,
        is_active: row.try_get::<i64, _>("is_active").map_err(|e| EngineError::storage(e.to_string()))? != 0,
        internal_session_ids,
        current_internal_session_id: current,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(|e| EngineError::storage(e.to_string()))?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at").map_err(|e| EngineError::storage(e.to_string()))?)?,
    })
}

pub fn internal_session_from_row(row: &SqliteRow) -> EngineResult<InternalSession> {
    let state_json: String = row.try_get("session_state").map_err(|e| EngineError::storage(e.to_string()))?;
    let history_json: String = row
        .try_get("conversation_history")
        .map_err(|e| EngineError::storage(e.to_string()))?;
    let session_state: HashMap<String, Value> = serde_json::from_str(&state_json)?;
    let conversation_history: Vec<HistoryEntry> = serde_json::from_str(&history_json)?;

    Ok(InternalSession {
        internal_session_id: row
            .try_get("internal_session_id")
            .map_err(|e| EngineError::storage(e.to_string()))?,
        parent_external_session_id: row
            .try_get("parent_external_session_id")
            .map_err(|e| EngineError::storage(e.to_string()))?,
        model_session_id: row
            .try_get("model_session_id")
            .map_err(|e| EngineError::storage(e.to_string()))?,
        session_state,
        conversation_history,
        is_current: row.try_get::<i64, _>("is_current").map_err(|e| EngineError::storage(e.to_string()))? != 0,
        checkpoint_counter: row
            .try_get::<i64, _>("checkpoint_counter")
            .map_err(|e| EngineError::storage(e.to_string()))? as u64,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(|e| EngineError::storage(e.to_string()))?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at").map_err(|e| EngineError::storage(e.to_string()))?)?,
    })
}

pub fn checkpoint_from_row(row: &SqliteRow) -> EngineResult<Checkpoint> {
    let state_json: String = row.try_get("session_state").map_err(|e| EngineError::storage(e.to_string()))?;
    let history_json: String = row
        .try_get("conversation_history")
        .map_err(|e| EngineError::storage(e.to_string()))?;
    let metadata_json: String = row.try_get("metadata").map_err(|e| EngineError::storage(e.to_string()))?;

    Ok(Checkpoint {
        checkpoint_id: row.try_get("checkpoint_id").map_err(|e| EngineError::storage(e.to_string()))?,
        owning_internal_session_id: row
            .try_get("owning_internal_session_id")
            .map_err(|e| EngineError::storage(e.to_string()))?,
        name: row.try_get("name").map_err(|e| EngineError::storage(e.to_string()))?,
        is_auto: row.try_get::<i64, _>("is_auto").map_err(|e| EngineError::storage(e.to_string()))? != 0,
        session_state: serde_json::from_str(&state_json)?,
        conversation_history: serde_json::from_str(&history_json)?,
        metadata: serde_json::from_str(&metadata_json)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(|e| EngineError::storage(e.to_string()))?)?,
    })
}
