use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::internal_session::HistoryEntry;

/// Metadata key carrying the Track index captured at checkpoint creation.
pub const TOOL_TRACK_POSITION_KEY: &str = "tool_track_position";

/// An immutable snapshot of an internal session.
///
/// Invariant: once written, never mutated. `tool_track_position` is always
/// `<=` the Track length at the moment the checkpoint was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub checkpoint_id: i64,
    pub owning_internal_session_id: i64,
    pub name: Option<String>,
    pub is_auto: bool,
    pub session_state: HashMap<String, Value>,
    pub conversation_history: Vec<HistoryEntry>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        checkpoint_id: i64,
        owning_internal_session_id: i64,
        name: Option<String>,
        is_auto: bool,
        session_state: HashMap<String, Value>,
        conversation_history: Vec<HistoryEntry>,
        tool_track_position: usize,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            TOOL_TRACK_POSITION_KEY.to_string(),
            Value::from(tool_track_position),
        );
        Self {
            checkpoint_id,
            owning_internal_session_id,
            name,
            is_auto,
            session_state,
            conversation_history,
            metadata,
            created_at: Utc::now(),
        }
    }

    pub fn tool_track_position(&self) -> usize {
        self.metadata
            .get(TOOL_TRACK_POSITION_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }

    /// Case-insensitive substring match used by `rollback_to_checkpoint`.
    pub fn name_matches(&self, query: &str) -> bool {
        self.name
            .as_deref()
            .map(|n| n.to_lowercase().contains(&query.to_lowercase()))
            .unwrap_or(false)
    }
}
