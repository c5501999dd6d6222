use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conversation turn's speaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry in an internal session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One logical "take" on a conversation; the unit a rollback forks.
///
/// Invariant: at most one internal session per external session has
/// `is_current = true`. `checkpoint_counter` is monotonically
/// non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalSession {
    pub internal_session_id: i64,
    pub parent_external_session_id: i64,
    /// Opaque model-layer session id, stable within one take.
    pub model_session_id: String,
    pub session_state: HashMap<String, Value>,
    pub conversation_history: Vec<HistoryEntry>,
    pub is_current: bool,
    pub checkpoint_counter: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InternalSession {
    pub fn new(internal_session_id: i64, parent_external_session_id: i64) -> Self {
        let now = Utc::now();
        Self {
            internal_session_id,
            parent_external_session_id,
            model_session_id: uuid::Uuid::new_v4().to_string(),
            session_state: HashMap::new(),
            conversation_history: Vec::new(),
            is_current: true,
            checkpoint_counter: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn append_turn(&mut self, role: Role, content: impl Into<String>) {
        self.conversation_history.push(HistoryEntry::new(role, content));
        self.updated_at = Utc::now();
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.session_state.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn state_flag(&self, key: &str) -> bool {
        matches!(self.session_state.get(key), Some(Value::Bool(true)))
    }
}
