use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and authorization record.
///
/// The engine never hashes credentials itself; callers supply an
/// already-hashed `credential_hash` at registration time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub credential_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Username the Store seeds on initialization, mirroring the reference
/// implementation's bootstrap admin account.
pub const ROOT_USERNAME: &str = "rootusr";

impl User {
    pub fn new(user_id: i64, username: impl Into<String>, credential_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username: username.into(),
            credential_hash: credential_hash.into(),
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn root(user_id: i64, credential_hash: impl Into<String>) -> Self {
        let mut user = Self::new(user_id, ROOT_USERNAME, credential_hash);
        user.is_admin = true;
        user
    }
}
