//! Assignments store - direct grants of items to users

use std::collections::HashMap;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use crate::assignment::Assignment;
use crate::config::TableNames;
use crate::{Error, Result};
use super::sqlite::{placeholders, quote_identifier, Database, MAX_BOUND_NAMES};

const ASSIGNMENT_COLUMNS: &str = "itemName, userId, createdAt";

/// Storage for user assignments. No hierarchy is involved.
pub struct AssignmentsStore<'a> {
    db: &'a Database,
    table: String,
    /// Checked on insert when the item tree lives in the same database
    items_table: Option<String>,
}

impl<'a> AssignmentsStore<'a> {
    /// Fails with `InvalidConfiguration` when no assignments table is configured.
    pub fn new(db: &'a Database, tables: &TableNames) -> Result<Self> {
        tables.validate()?;
        let table = tables.assignments.as_deref().ok_or_else(|| {
            Error::InvalidConfiguration("Assignments store requires an assignments table name".to_string())
        })?;

        Ok(Self {
            db,
            table: quote_identifier(table),
            items_table: tables.items.as_deref().map(quote_identifier),
        })
    }

    fn conn(&self) -> &Connection {
        self.db.connection()
    }

    fn query(&self, sql: &str, values: &[&str]) -> Result<Vec<Assignment>> {
        let mut stmt = self.conn().prepare_cached(sql)?;
        let assignments = stmt
            .query_map(params_from_iter(values), row_to_assignment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(assignments)
    }

    // ========== Read Operations ==========

    /// All assignments keyed by user id, then by item name
    pub fn get_all(&self) -> Result<HashMap<String, HashMap<String, Assignment>>> {
        let rows = self.query(&format!("SELECT {ASSIGNMENT_COLUMNS} FROM {}", self.table), &[])?;
        let mut by_user: HashMap<String, HashMap<String, Assignment>> = HashMap::new();
        for assignment in rows {
            by_user
                .entry(assignment.user_id.clone())
                .or_default()
                .insert(assignment.item_name.clone(), assignment);
        }
        Ok(by_user)
    }

    /// Assignments of one user keyed by item name
    pub fn get_by_user_id(&self, user_id: &str) -> Result<HashMap<String, Assignment>> {
        let rows = self.query(
            &format!("SELECT {ASSIGNMENT_COLUMNS} FROM {} WHERE userId = ?1", self.table),
            &[user_id],
        )?;
        Ok(rows
            .into_iter()
            .map(|assignment| (assignment.item_name.clone(), assignment))
            .collect())
    }

    /// Assignments of any user to any of `item_names`
    pub fn get_by_item_names(&self, item_names: &[&str]) -> Result<Vec<Assignment>> {
        let mut assignments = Vec::new();
        for chunk in item_names.chunks(MAX_BOUND_NAMES) {
            assignments.extend(self.query(
                &format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM {} WHERE itemName IN ({}) ORDER BY itemName, userId",
                    self.table,
                    placeholders(chunk.len())
                ),
                chunk,
            )?);
        }
        Ok(assignments)
    }

    pub fn get(&self, item_name: &str, user_id: &str) -> Result<Option<Assignment>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM {} WHERE itemName = ?1 AND userId = ?2",
                    self.table
                ),
                [item_name, user_id],
                row_to_assignment,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn exists(&self, item_name: &str, user_id: &str) -> Result<bool> {
        self.row_exists(
            &format!(
                "SELECT 1 AS assignment_exists FROM {} WHERE itemName = ?1 AND userId = ?2",
                self.table
            ),
            &[item_name, user_id],
        )
    }

    /// Whether the user holds at least one of `item_names` directly
    pub fn user_has_item(&self, user_id: &str, item_names: &[&str]) -> Result<bool> {
        for chunk in item_names.chunks(MAX_BOUND_NAMES) {
            let values: Vec<&str> = std::iter::once(user_id).chain(chunk.iter().copied()).collect();
            let found = self.row_exists(
                &format!(
                    "SELECT 1 AS assignment_exists FROM {} WHERE userId = ? AND itemName IN ({})",
                    self.table,
                    placeholders(chunk.len())
                ),
                &values,
            )?;
            if found {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The subset of `item_names` held by the user, in input order
    pub fn filter_user_item_names(&self, user_id: &str, item_names: &[&str]) -> Result<Vec<String>> {
        let mut held = std::collections::HashSet::new();
        for chunk in item_names.chunks(MAX_BOUND_NAMES) {
            let values: Vec<&str> = std::iter::once(user_id).chain(chunk.iter().copied()).collect();
            let mut stmt = self.conn().prepare_cached(&format!(
                "SELECT itemName FROM {} WHERE userId = ? AND itemName IN ({})",
                self.table,
                placeholders(chunk.len())
            ))?;
            let names = stmt
                .query_map(params_from_iter(values), |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            held.extend(names);
        }
        Ok(item_names
            .iter()
            .filter(|name| held.contains(**name))
            .map(|name| name.to_string())
            .collect())
    }

    /// Whether any user holds the item
    pub fn has_item(&self, item_name: &str) -> Result<bool> {
        self.row_exists(
            &format!("SELECT 1 AS assignment_exists FROM {} WHERE itemName = ?1", self.table),
            &[item_name],
        )
    }

    // ========== Write Operations ==========

    /// Insert an assignment.
    ///
    /// When the items table is configured the item must exist; a missing item
    /// is a `ConstraintViolation`. A duplicate key surfaces the engine error.
    pub fn add(&self, assignment: &Assignment) -> Result<()> {
        tracing::debug!("Assigning {} to user {}", assignment.item_name, assignment.user_id);
        let Some(items) = &self.items_table else {
            self.conn().execute(
                &format!("INSERT INTO {} ({ASSIGNMENT_COLUMNS}) VALUES (?1, ?2, ?3)", self.table),
                params![assignment.item_name, assignment.user_id, assignment.created_at],
            )?;
            return Ok(());
        };

        let inserted = self.conn().execute(
            &format!(
                "INSERT INTO {} ({ASSIGNMENT_COLUMNS})
                 SELECT ?1, ?2, ?3 WHERE EXISTS (SELECT 1 FROM {items} WHERE name = ?1)",
                self.table
            ),
            params![assignment.item_name, assignment.user_id, assignment.created_at],
        )?;
        if inserted == 0 {
            return Err(Error::ConstraintViolation(format!(
                "Item {:?} does not exist",
                assignment.item_name
            )));
        }
        Ok(())
    }

    /// Point every assignment of `old_name` at `new_name`
    pub fn rename_item(&self, old_name: &str, new_name: &str) -> Result<()> {
        if old_name == new_name {
            return Ok(());
        }
        tracing::debug!("Renaming assignments of {} to {}", old_name, new_name);
        self.conn().execute(
            &format!("UPDATE {} SET itemName = ?2 WHERE itemName = ?1", self.table),
            [old_name, new_name],
        )?;
        Ok(())
    }

    pub fn remove(&self, item_name: &str, user_id: &str) -> Result<()> {
        tracing::debug!("Revoking {} from user {}", item_name, user_id);
        self.conn().execute(
            &format!("DELETE FROM {} WHERE itemName = ?1 AND userId = ?2", self.table),
            [item_name, user_id],
        )?;
        Ok(())
    }

    pub fn remove_by_user_id(&self, user_id: &str) -> Result<()> {
        tracing::debug!("Revoking all items from user {}", user_id);
        self.conn().execute(
            &format!("DELETE FROM {} WHERE userId = ?1", self.table),
            [user_id],
        )?;
        Ok(())
    }

    pub fn remove_by_item_name(&self, item_name: &str) -> Result<()> {
        tracing::debug!("Revoking {} from all users", item_name);
        self.conn().execute(
            &format!("DELETE FROM {} WHERE itemName = ?1", self.table),
            [item_name],
        )?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        tracing::debug!("Clearing assignments");
        self.conn().execute(&format!("DELETE FROM {}", self.table), [])?;
        Ok(())
    }

    fn row_exists(&self, sql: &str, values: &[&str]) -> Result<bool> {
        let found = self
            .conn()
            .query_row(sql, params_from_iter(values), |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

/// Helper to convert a row selected with `ASSIGNMENT_COLUMNS` to an Assignment
fn row_to_assignment(row: &rusqlite::Row) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        item_name: row.get(0)?,
        user_id: row.get(1)?,
        created_at: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Dialect, ItemsStore, SchemaManager};
    use crate::testing::{memory_db, seed_blog};

    fn seeded(db: &Database) -> AssignmentsStore<'_> {
        let items = ItemsStore::new(db, &TableNames::default()).unwrap();
        seed_blog(&items);
        AssignmentsStore::new(db, &TableNames::default()).unwrap()
    }

    #[test]
    fn test_user_has_item_scenario() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        store.add(&Assignment::new("42", "author", 1_700_000_000)).unwrap();

        assert!(store.user_has_item("42", &["author", "viewArticle"]).unwrap());
        store.remove_by_item_name("author").unwrap();
        assert!(!store.user_has_item("42", &["author", "viewArticle"]).unwrap());
    }

    #[test]
    fn test_user_has_item_empty_names() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        store.add(&Assignment::new("42", "author", 1)).unwrap();
        assert!(!store.user_has_item("42", &[]).unwrap());
    }

    #[test]
    fn test_get_and_exists() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        let assignment = Assignment::new("42", "author", 1_700_000_000);
        store.add(&assignment).unwrap();

        assert_eq!(store.get("author", "42").unwrap(), Some(assignment));
        assert_eq!(store.get("author", "7").unwrap(), None);
        assert!(store.exists("author", "42").unwrap());
        assert!(!store.exists("admin", "42").unwrap());
        assert!(store.has_item("author").unwrap());
        assert!(!store.has_item("admin").unwrap());
    }

    #[test]
    fn test_grouped_reads() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        store.add(&Assignment::new("42", "author", 1)).unwrap();
        store.add(&Assignment::new("42", "viewArticle", 2)).unwrap();
        store.add(&Assignment::new("7", "admin", 3)).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["42"].len(), 2);
        assert_eq!(all["7"]["admin"].created_at, 3);

        let user = store.get_by_user_id("42").unwrap();
        assert_eq!(user.len(), 2);
        assert!(user.contains_key("viewArticle"));
        assert!(store.get_by_user_id("nobody").unwrap().is_empty());

        let by_items = store.get_by_item_names(&["admin", "author"]).unwrap();
        let pairs: Vec<(&str, &str)> = by_items
            .iter()
            .map(|a| (a.item_name.as_str(), a.user_id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("admin", "7"), ("author", "42")]);
        assert!(store.get_by_item_names(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_filter_user_item_names() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        store.add(&Assignment::new("42", "author", 1)).unwrap();
        store.add(&Assignment::new("42", "guest", 1)).unwrap();

        assert_eq!(
            store.filter_user_item_names("42", &["guest", "admin", "author"]).unwrap(),
            vec!["guest".to_string(), "author".to_string()]
        );
        assert!(store.filter_user_item_names("7", &["guest"]).unwrap().is_empty());
    }

    #[test]
    fn test_add_constraints() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        store.add(&Assignment::new("42", "author", 1)).unwrap();

        let duplicate = store.add(&Assignment::new("42", "author", 2)).unwrap_err();
        assert!(duplicate.is_constraint_violation());

        let missing = store.add(&Assignment::new("42", "nobody", 1)).unwrap_err();
        assert!(matches!(missing, Error::ConstraintViolation(_)));
    }

    #[test]
    fn test_assignments_only_deployment() {
        let db = Database::open_in_memory().unwrap();
        SchemaManager::new(&db, TableNames::assignments_only())
            .unwrap()
            .ensure_tables()
            .unwrap();
        let store = AssignmentsStore::new(&db, &TableNames::assignments_only()).unwrap();

        // No items relation to check against
        store.add(&Assignment::new("42", "anything", 1)).unwrap();
        assert!(store.exists("anything", "42").unwrap());
    }

    #[test]
    fn test_store_requires_assignments_table() {
        let db = Database::open_in_memory().unwrap();
        let err = AssignmentsStore::new(&db, &TableNames::items_only()).err().unwrap();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_rename_item_follows_item_rename() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        let items = ItemsStore::new(&db, &TableNames::default()).unwrap();
        store.add(&Assignment::new("42", "author", 1)).unwrap();

        let renamed = items.get("author").unwrap().unwrap().with_name("writer");
        items.update("author", &renamed).unwrap();
        store.rename_item("author", "writer").unwrap();

        assert!(store.exists("writer", "42").unwrap());
        assert!(!store.has_item("author").unwrap());
    }

    #[test]
    fn test_removals() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        for (user, item) in [("42", "author"), ("42", "guest"), ("7", "guest"), ("7", "admin")] {
            store.add(&Assignment::new(user, item, 1)).unwrap();
        }

        store.remove("author", "42").unwrap();
        assert!(!store.exists("author", "42").unwrap());

        store.remove_by_user_id("7").unwrap();
        assert!(store.get_by_user_id("7").unwrap().is_empty());
        assert!(store.exists("guest", "42").unwrap());

        store.clear().unwrap();
        assert!(store.get_all().unwrap().is_empty());
        assert_eq!(db.count_rows("rbac_assignment").unwrap(), 0);
    }

    #[test]
    fn test_assignment_now_is_stamped() {
        let db = memory_db(Dialect::Sqlite);
        let store = seeded(&db);
        store.add(&Assignment::now("42", "guest")).unwrap();
        let stored = store.get("guest", "42").unwrap().unwrap();
        assert!(stored.created_at > 0);
    }
}
