//! Assignment - a direct grant of an item to a user

use serde::{Deserialize, Serialize};

/// A user holding an item directly, without inheritance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub user_id: String,
    pub item_name: String,
    /// Epoch seconds
    pub created_at: i64,
}

impl Assignment {
    pub fn new(user_id: impl Into<String>, item_name: impl Into<String>, created_at: i64) -> Self {
        Self {
            user_id: user_id.into(),
            item_name: item_name.into(),
            created_at,
        }
    }

    /// Create an assignment stamped with the current time
    pub fn now(user_id: impl Into<String>, item_name: impl Into<String>) -> Self {
        Self::new(user_id, item_name, crate::item::now_secs())
    }
}
