use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The user-visible conversation container. Persists across rollbacks; an
/// external session's children are its forks (`InternalSession`s).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalSession {
    pub external_session_id: i64,
    pub owner_user_id: i64,
    pub display_name: String,
    pub is_active: bool,
    /// Ordered list of child internal session ids, oldest first.
    pub internal_session_ids: Vec<i64>,
    /// `None` until the first internal session is created.
    ///
    /// Invariant: if `Some`, the value is an element of `internal_session_ids`.
    pub current_internal_session_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExternalSession {
    pub fn new(external_session_id: i64, owner_user_id: i64, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            external_session_id,
            owner_user_id,
            display_name: display_name.into(),
            is_active: true,
            internal_session_ids: Vec::new(),
            current_internal_session_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a newly created internal session as the current one.
    pub fn push_internal_session(&mut self, internal_session_id: i64) {
        self.internal_session_ids.push(internal_session_id);
        self.current_internal_session_id = Some(internal_session_id);
        self.updated_at = Utc::now();
    }

    /// `current_internal_session` is either null or an element of the
    /// children list.
    pub fn is_consistent(&self) -> bool {
        match self.current_internal_session_id {
            None => true,
            Some(id) => self.internal_session_ids.contains(&id),
        }
    }
}
