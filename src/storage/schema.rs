//! Database schema definitions
//!
//! Table names are configurable, so DDL is rendered by [`TableSchema`]
//! instead of being kept as fixed statements.

use crate::config::TableNames;
use crate::{Error, Result};
use super::sqlite::{quote_identifier, Database};

/// Column type used by the RBAC tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `VARCHAR(n)`
    String(u16),
    Integer,
}

impl ColumnType {
    fn sql(&self) -> String {
        match self {
            ColumnType::String(len) => format!("VARCHAR({len})"),
            ColumnType::Integer => "INTEGER".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    kind: ColumnType,
    nullable: bool,
}

#[derive(Debug, Clone)]
struct ForeignKey {
    name: String,
    column: String,
    references_table: String,
    references_column: String,
}

#[derive(Debug, Clone)]
struct Index {
    name: String,
    columns: Vec<String>,
}

/// Definition of one table, rendered to `CREATE` statements.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    primary_keys: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
    indexes: Vec<Index>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_column(mut self, name: &str, kind: ColumnType, nullable: bool) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            kind,
            nullable,
        });
        self
    }

    pub fn set_primary_keys(mut self, columns: &[&str]) -> Self {
        self.primary_keys = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Reference `table(column)`; delete/update behavior is the engine default
    pub fn add_foreign_key(mut self, name: &str, column: &str, table: &str, references: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            name: name.to_string(),
            column: column.to_string(),
            references_table: table.to_string(),
            references_column: references.to_string(),
        });
        self
    }

    pub fn add_index(mut self, name: &str, columns: &[&str]) -> Self {
        self.indexes.push(Index {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// `CREATE TABLE` followed by one `CREATE INDEX` per index
    pub fn create_statements(&self) -> Vec<String> {
        let mut definitions: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let null = if column.nullable { "" } else { " NOT NULL" };
                format!("    {} {}{}", column.name, column.kind.sql(), null)
            })
            .collect();

        if !self.primary_keys.is_empty() {
            definitions.push(format!("    PRIMARY KEY ({})", self.primary_keys.join(", ")));
        }

        for fk in &self.foreign_keys {
            definitions.push(format!(
                "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_identifier(&fk.name),
                fk.column,
                quote_identifier(&fk.references_table),
                fk.references_column,
            ));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote_identifier(&self.name),
            definitions.join(",\n"),
        )];

        statements.extend(self.indexes.iter().map(|index| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_identifier(&index.name),
                quote_identifier(&self.name),
                index.columns.join(", "),
            )
        }));

        statements
    }
}

/// Items table: `name` primary key, indexed `type`
pub fn items_table_schema(items: &str) -> TableSchema {
    TableSchema::new(items)
        .add_column("name", ColumnType::String(128), false)
        .add_column("type", ColumnType::String(10), false)
        .add_column("description", ColumnType::String(191), true)
        .add_column("ruleName", ColumnType::String(64), true)
        .add_column("createdAt", ColumnType::Integer, false)
        .add_column("updatedAt", ColumnType::Integer, false)
        .set_primary_keys(&["name"])
        .add_index(&format!("idx-{items}-type"), &["type"])
}

/// Edges table: both columns reference the items table
pub fn items_children_table_schema(items: &str, children: &str) -> TableSchema {
    TableSchema::new(children)
        .add_column("parent", ColumnType::String(128), false)
        .add_column("child", ColumnType::String(128), false)
        .set_primary_keys(&["parent", "child"])
        .add_foreign_key(&format!("fk-{children}-parent"), "parent", items, "name")
        .add_foreign_key(&format!("fk-{children}-child"), "child", items, "name")
        .add_index(&format!("idx-{children}-parent"), &["parent"])
        .add_index(&format!("idx-{children}-child"), &["child"])
}

/// Assignments table; the item reference is checked by the store, not by a key
pub fn assignments_table_schema(assignments: &str) -> TableSchema {
    TableSchema::new(assignments)
        .add_column("itemName", ColumnType::String(128), false)
        .add_column("userId", ColumnType::String(128), false)
        .add_column("createdAt", ColumnType::Integer, false)
        .set_primary_keys(&["itemName", "userId"])
}

/// Creates, drops and inspects the RBAC tables.
pub struct SchemaManager<'a> {
    db: &'a Database,
    tables: TableNames,
}

impl<'a> SchemaManager<'a> {
    /// Fails with `InvalidConfiguration` when the table names are unusable
    pub fn new(db: &'a Database, tables: TableNames) -> Result<Self> {
        tables.validate()?;
        Ok(Self { db, tables })
    }

    pub fn items_table(&self) -> Option<&str> {
        self.tables.items.as_deref()
    }

    pub fn items_children_table(&self) -> Option<&str> {
        self.tables.items_children.as_deref()
    }

    pub fn assignments_table(&self) -> Option<&str> {
        self.tables.assignments.as_deref()
    }

    /// Create the items table unless unconfigured or present
    pub fn create_items_table(&self) -> Result<()> {
        let Some(items) = self.items_table() else {
            return Ok(());
        };
        if self.has_table(items)? {
            return Ok(());
        }
        self.save(&items_table_schema(items))
    }

    pub fn create_items_children_table(&self) -> Result<()> {
        let Some((items, children)) = self.tables.item_tree() else {
            return Ok(());
        };
        if self.has_table(children)? {
            return Ok(());
        }
        self.save(&items_children_table_schema(items, children))
    }

    pub fn create_assignments_table(&self) -> Result<()> {
        let Some(assignments) = self.assignments_table() else {
            return Ok(());
        };
        if self.has_table(assignments)? {
            return Ok(());
        }
        self.save(&assignments_table_schema(assignments))
    }

    /// Create every configured table that is missing
    pub fn ensure_tables(&self) -> Result<()> {
        self.create_items_table()?;
        self.create_items_children_table()?;
        self.create_assignments_table()?;
        Ok(())
    }

    /// Drop every configured table that exists, children and assignments first
    pub fn ensure_no_tables(&self) -> Result<()> {
        let ordered = [
            self.items_children_table(),
            self.assignments_table(),
            self.items_table(),
        ];
        for table in ordered.into_iter().flatten() {
            if self.has_table(table)? {
                self.drop_table(table)?;
            }
        }
        Ok(())
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Err(Error::InvalidInput("Table name must be non-empty".to_string()));
        }
        self.db.has_table(name)
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidInput("Table name must be non-empty".to_string()));
        }
        tracing::info!("Dropping table {}", name);
        self.db.drop_table(name)
    }

    fn save(&self, schema: &TableSchema) -> Result<()> {
        tracing::info!("Creating table {}", schema.name());
        self.db.transaction(|conn| {
            for stmt in schema.create_statements() {
                conn.execute(&stmt, [])?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Dialect;

    fn columns(db: &Database, table: &str) -> Vec<(String, String, bool, i64)> {
        let mut stmt = db
            .connection()
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))
            .unwrap();
        stmt.query_map([], |row| {
            let notnull: i64 = row.get(3)?;
            Ok((row.get(1)?, row.get(2)?, notnull == 1, row.get(5)?))
        })
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
    }

    fn index_names(db: &Database, table: &str) -> Vec<String> {
        let mut stmt = db
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL ORDER BY name")
            .unwrap();
        stmt.query_map([table], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_ensure_tables_creates_all() {
        let db = Database::open_in_memory_with_dialect(Dialect::Sqlite).unwrap();
        let manager = SchemaManager::new(&db, TableNames::default()).unwrap();
        manager.ensure_tables().unwrap();

        assert!(manager.has_table("rbac_item").unwrap());
        assert!(manager.has_table("rbac_item_child").unwrap());
        assert!(manager.has_table("rbac_assignment").unwrap());

        let items = columns(&db, "rbac_item");
        assert_eq!(items.len(), 6);
        assert_eq!(items[0], ("name".to_string(), "VARCHAR(128)".to_string(), true, 1));
        assert_eq!(items[2], ("description".to_string(), "VARCHAR(191)".to_string(), false, 0));
        assert_eq!(index_names(&db, "rbac_item"), vec!["idx-rbac_item-type".to_string()]);

        let children = columns(&db, "rbac_item_child");
        assert_eq!(children[0].3, 1);
        assert_eq!(children[1].3, 2);
        assert_eq!(
            index_names(&db, "rbac_item_child"),
            vec![
                "idx-rbac_item_child-child".to_string(),
                "idx-rbac_item_child-parent".to_string(),
            ]
        );

        let assignments = columns(&db, "rbac_assignment");
        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[0].3, 1);
        assert_eq!(assignments[1].3, 2);
    }

    #[test]
    fn test_children_foreign_keys() {
        let db = Database::open_in_memory_with_dialect(Dialect::Sqlite).unwrap();
        SchemaManager::new(&db, TableNames::default())
            .unwrap()
            .ensure_tables()
            .unwrap();

        let mut stmt = db
            .connection()
            .prepare("PRAGMA foreign_key_list(rbac_item_child)")
            .unwrap();
        let mut fks: Vec<(String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(2)?, row.get(3)?, row.get(4)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        fks.sort();
        assert_eq!(
            fks,
            vec![
                ("rbac_item".to_string(), "child".to_string(), "name".to_string()),
                ("rbac_item".to_string(), "parent".to_string(), "name".to_string()),
            ]
        );
    }

    #[test]
    fn test_ensure_tables_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db, TableNames::default()).unwrap();
        manager.ensure_tables().unwrap();
        let before = columns(&db, "rbac_item");
        manager.ensure_tables().unwrap();
        assert_eq!(columns(&db, "rbac_item"), before);
        assert_eq!(index_names(&db, "rbac_item").len(), 1);
    }

    #[test]
    fn test_ensure_no_tables() {
        let db = Database::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db, TableNames::default()).unwrap();
        manager.ensure_tables().unwrap();
        manager.ensure_no_tables().unwrap();
        manager.ensure_no_tables().unwrap();

        assert!(!manager.has_table("rbac_item").unwrap());
        assert!(!manager.has_table("rbac_item_child").unwrap());
        assert!(!manager.has_table("rbac_assignment").unwrap());
    }

    #[test]
    fn test_partial_deployments() {
        let db = Database::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db, TableNames::assignments_only()).unwrap();
        manager.ensure_tables().unwrap();
        assert!(manager.has_table("rbac_assignment").unwrap());
        assert!(!manager.has_table("rbac_item").unwrap());
        assert!(manager.items_table().is_none());

        let db = Database::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db, TableNames::items_only()).unwrap();
        manager.ensure_tables().unwrap();
        assert!(manager.has_table("rbac_item").unwrap());
        assert!(manager.has_table("rbac_item_child").unwrap());
        assert!(!manager.has_table("rbac_assignment").unwrap());
    }

    #[test]
    fn test_custom_names() {
        let db = Database::open_in_memory().unwrap();
        let names = TableNames::new(Some("auth_item"), Some("auth_item_child"), Some("auth_assignment"));
        let manager = SchemaManager::new(&db, names).unwrap();
        manager.ensure_tables().unwrap();
        assert_eq!(manager.items_children_table(), Some("auth_item_child"));
        assert!(db.has_table("auth_item_child").unwrap());
    }

    #[test]
    fn test_empty_table_name_is_invalid_input() {
        let db = Database::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db, TableNames::default()).unwrap();
        assert!(matches!(manager.has_table("").unwrap_err(), Error::InvalidInput(_)));
        assert!(matches!(manager.drop_table("").unwrap_err(), Error::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_configuration() {
        let db = Database::open_in_memory().unwrap();
        let err = SchemaManager::new(&db, TableNames::new(Some("item"), None, None))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_create_statements() {
        let statements = items_children_table_schema("item", "item_child").create_statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("PRIMARY KEY (parent, child)"));
        assert!(statements[0].contains("CONSTRAINT \"fk-item_child-parent\" FOREIGN KEY (parent) REFERENCES \"item\" (name)"));
        assert_eq!(
            statements[1],
            "CREATE INDEX IF NOT EXISTS \"idx-item_child-parent\" ON \"item_child\" (parent)"
        );
    }
}
