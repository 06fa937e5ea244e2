use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::Dialect;
use crate::{Error, Result};

pub const DEFAULT_ITEMS_TABLE: &str = "rbac_item";
pub const DEFAULT_ITEMS_CHILDREN_TABLE: &str = "rbac_item_child";
pub const DEFAULT_ASSIGNMENTS_TABLE: &str = "rbac_assignment";

const MAX_IDENTIFIER_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    pub database: Option<String>,
    /// Detected from the connection when absent
    pub dialect: Option<Dialect>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub tables: TableNames,
}

/// Names of the three relations.
///
/// Each one may be left out: items and children together for an
/// assignments-only deployment, or assignments for an items-tree-only one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    pub items: Option<String>,
    pub items_children: Option<String>,
    pub assignments: Option<String>,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            items: Some(DEFAULT_ITEMS_TABLE.to_string()),
            items_children: Some(DEFAULT_ITEMS_CHILDREN_TABLE.to_string()),
            assignments: Some(DEFAULT_ASSIGNMENTS_TABLE.to_string()),
        }
    }
}

impl TableNames {
    pub fn new(
        items: Option<&str>,
        items_children: Option<&str>,
        assignments: Option<&str>,
    ) -> Self {
        Self {
            items: items.map(str::to_string),
            items_children: items_children.map(str::to_string),
            assignments: assignments.map(str::to_string),
        }
    }

    /// Items-tree-only deployment with the default names
    pub fn items_only() -> Self {
        Self {
            assignments: None,
            ..Self::default()
        }
    }

    /// Assignments-only deployment with the default name
    pub fn assignments_only() -> Self {
        Self::new(None, None, Some(DEFAULT_ASSIGNMENTS_TABLE))
    }

    /// Check that the names describe a usable deployment.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_none() && self.items_children.is_none() && self.assignments.is_none() {
            return Err(Error::InvalidConfiguration(
                "At least items and items children table names or assignments table name must be set".to_string(),
            ));
        }

        if self.items.is_some() != self.items_children.is_some() {
            return Err(Error::InvalidConfiguration(
                "Items and items children table names must be set together".to_string(),
            ));
        }

        for (label, name) in [
            ("Items", &self.items),
            ("Items children", &self.items_children),
            ("Assignments", &self.assignments),
        ] {
            if let Some(name) = name {
                if name.is_empty() {
                    return Err(Error::InvalidConfiguration(format!(
                        "{label} table name can't be empty"
                    )));
                }
                if !is_identifier(name) {
                    return Err(Error::InvalidConfiguration(format!(
                        "{label} table name {name:?} is not a valid identifier"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Items and children table names, when the item tree is configured
    pub fn item_tree(&self) -> Option<(&str, &str)> {
        match (&self.items, &self.items_children) {
            (Some(items), Some(children)) => Some((items.as_str(), children.as_str())),
            _ => None,
        }
    }
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`, bounded length.
///
/// Table names end up interpolated into statements, so nothing else passes.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("rbac.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    config.tables.validate()?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Create the directory that will hold the database file
pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    match db_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir)?;
            tracing::debug!("Database directory {} is ready", dir.display());
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names_are_valid() {
        TableNames::default().validate().unwrap();
        TableNames::items_only().validate().unwrap();
        TableNames::assignments_only().validate().unwrap();
    }

    #[test]
    fn test_items_and_children_must_be_paired() {
        let err = TableNames::new(Some("item"), None, Some("assignment"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));

        let err = TableNames::new(None, Some("item_child"), None)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_all_tables_missing_rejected() {
        let err = TableNames::new(None, None, None).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_empty_and_malformed_names_rejected() {
        for names in [
            TableNames::new(Some(""), Some("item_child"), None),
            TableNames::new(Some("item"), Some(""), None),
            TableNames::new(None, None, Some("")),
            TableNames::new(Some("item; DROP TABLE x"), Some("item_child"), None),
            TableNames::new(None, None, Some("1assignment")),
        ] {
            let err = names.validate().unwrap_err();
            assert!(matches!(err, Error::InvalidConfiguration(_)), "{names:?}");
        }
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("rbac_item"));
        assert!(is_identifier("_tmp1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("item-child"));
        assert!(!is_identifier(&"x".repeat(65)));
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_config_roundtrip_and_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rbac.toml");
        let config = StoreConfig {
            database: Some("rbac.db".to_string()),
            dialect: Some(Dialect::MysqlLegacy),
            log_level: Some("debug".to_string()),
            tables: TableNames::items_only(),
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.database.as_deref(), Some("rbac.db"));
        assert_eq!(loaded.dialect, Some(Dialect::MysqlLegacy));
        assert_eq!(loaded.tables, TableNames::items_only());
    }

    #[test]
    fn test_tables_section_enables_only_listed_tables() {
        let config: StoreConfig = toml::from_str(
            r#"
            database = "rbac.db"

            [tables]
            assignments = "grants"
            "#,
        )
        .unwrap();
        assert_eq!(config.tables, TableNames::new(None, None, Some("grants")));
        config.tables.validate().unwrap();

        let config: StoreConfig = toml::from_str("dialect = \"postgres\"").unwrap();
        assert_eq!(config.tables, TableNames::default());
        assert_eq!(config.dialect, Some(Dialect::Postgres));
    }

    #[test]
    fn test_invalid_tables_fail_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rbac.toml");
        std::fs::write(&path, "[tables]\nitems = \"item\"\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data").join("rbac").join("rbac.db");
        ensure_db_dir(&db_path).unwrap();
        ensure_db_dir(&db_path).unwrap();
        assert!(db_path.parent().unwrap().is_dir());

        // A bare file name needs no directory
        ensure_db_dir(Path::new("rbac.db")).unwrap();
    }
}
