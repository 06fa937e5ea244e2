//! Item types - roles and permissions
//!
//! Every node of the authorization hierarchy is an item of one of two kinds:
//! - `Role`: groups permissions and other roles, assigned to users
//! - `Permission`: a named capability checked by the manager

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Kind of an item, persisted in the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Role,
    Permission,
}

impl ItemKind {
    /// Get the string representation stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Role => "role",
            ItemKind::Permission => "permission",
        }
    }

    /// Get all item kinds
    pub fn all() -> &'static [ItemKind] {
        &[ItemKind::Role, ItemKind::Permission]
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "role" => Ok(ItemKind::Role),
            "permission" => Ok(ItemKind::Permission),
            _ => Err(Error::UnknownItemKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A role or permission.
///
/// `name` is the primary key. Timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub description: Option<String>,
    /// Name of a rule evaluated by the manager, not owned here
    pub rule_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    /// Create a new item stamped with the current time
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        let now = now_secs();
        Self {
            name: name.into(),
            kind,
            description: None,
            rule_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Role)
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Permission)
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the rule name
    pub fn with_rule_name(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    /// Set both timestamps to `created_at`
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn with_updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Same item under another name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_role(&self) -> bool {
        self.kind == ItemKind::Role
    }

    pub fn is_permission(&self) -> bool {
        self.kind == ItemKind::Permission
    }
}

/// Column list shared by every query that maps rows through [`row_to_item`].
pub(crate) const ITEM_COLUMNS: &str = "name, type, description, ruleName, createdAt, updatedAt";

/// Same columns qualified with the `item` alias used in hierarchy queries.
pub(crate) const ITEM_COLUMNS_ALIASED: &str =
    "item.name, item.type, item.description, item.ruleName, item.createdAt, item.updatedAt";

/// Helper to convert a row selected with [`ITEM_COLUMNS`] to an Item
pub(crate) fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    let kind_str: String = row.get(1)?;
    let kind: ItemKind = kind_str.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Item {
        name: row.get(0)?,
        kind,
        description: row.get(2)?,
        rule_name: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_kind_roundtrip() {
        for kind in ItemKind::all() {
            let parsed: ItemKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = ItemKind::from_str("group").unwrap_err();
        assert!(matches!(err, Error::UnknownItemKind(ref s) if s == "group"));
    }

    #[test]
    fn test_item_builder() {
        let item = Item::permission("updatePost")
            .with_description("Update a post")
            .with_rule_name("isAuthor")
            .with_created_at(1_700_000_000)
            .with_updated_at(1_700_000_500);

        assert!(item.is_permission());
        assert!(!item.is_role());
        assert_eq!(item.description.as_deref(), Some("Update a post"));
        assert_eq!(item.rule_name.as_deref(), Some("isAuthor"));
        assert_eq!(item.created_at, 1_700_000_000);
        assert_eq!(item.updated_at, 1_700_000_500);
    }

    #[test]
    fn test_new_item_is_timestamped() {
        let item = Item::role("admin");
        assert!(item.created_at > 0);
        assert_eq!(item.created_at, item.updated_at);
    }

    #[test]
    fn test_serialized_field_names_match_columns() {
        let item = Item::role("admin").with_rule_name("r").with_created_at(5);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "role");
        assert_eq!(json["ruleName"], "r");
        assert_eq!(json["createdAt"], 5);
        assert_eq!(json["updatedAt"], 5);
    }
}
