use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use crate::core::types::DocRef;

fn default_active() -> bool {
    true
}

/// One user record, as stored in the `_users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub user: String,
    pub password: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// In-memory user table, keyed by user name.
#[derive(Debug, Default)]
pub struct AuthTable {
    users: HashMap<String, AuthInfo>,
}

impl AuthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from user documents. Documents without a string
    /// `user` and `password` are skipped.
    pub fn from_documents(documents: &[DocRef]) -> Self {
        let mut table = AuthTable::new();
        for doc in documents {
            match serde_json::from_value::<AuthInfo>(doc.body.clone()) {
                Ok(info) if !info.user.is_empty() => {
                    table.insert(info);
                }
                Ok(_) => tracing::warn!(key = %doc.key, "skipping user without name"),
                Err(e) => tracing::warn!(key = %doc.key, error = %e, "skipping malformed user"),
            }
        }
        table
    }

    pub fn insert(&mut self, info: AuthInfo) -> Option<AuthInfo> {
        self.users.insert(info.user.clone(), info)
    }

    pub fn get(&self, user: &str) -> Option<&AuthInfo> {
        self.users.get(user)
    }

    pub fn is_active(&self, user: &str) -> bool {
        self.users.get(user).is_some_and(|info| info.active)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
