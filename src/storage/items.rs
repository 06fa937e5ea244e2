//! Items store - roles, permissions and the edges between them
//!
//! Hierarchical reads are delegated to the [`ItemTreeTraversal`] picked for
//! the database dialect when the store is built.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use crate::config::TableNames;
use crate::item::{row_to_item, Item, ItemKind, ITEM_COLUMNS, ITEM_COLUMNS_ALIASED};
use crate::traversal::{self, ItemTreeTraversal};
use crate::{Error, Result};
use super::sqlite::{placeholders, quote_identifier, Database, MAX_BOUND_NAMES};

/// Storage for RBAC items and their parent/child relations.
pub struct ItemsStore<'a> {
    db: &'a Database,
    items_table: String,
    children_table: String,
    /// Assignments referencing a removed item are deleted with it
    assignments_table: Option<String>,
    traversal: Box<dyn ItemTreeTraversal + 'a>,
}

impl<'a> ItemsStore<'a> {
    /// Build a store over the items and children tables of `tables`.
    ///
    /// Fails with `InvalidConfiguration` when the item tree is not configured.
    pub fn new(db: &'a Database, tables: &TableNames) -> Result<Self> {
        tables.validate()?;
        let (items, children) = tables.item_tree().ok_or_else(|| {
            Error::InvalidConfiguration(
                "Items store requires items and items children table names".to_string(),
            )
        })?;

        Ok(Self {
            db,
            items_table: quote_identifier(items),
            children_table: quote_identifier(children),
            assignments_table: tables.assignments.as_deref().map(quote_identifier),
            traversal: traversal::for_dialect(db.dialect(), db.connection(), items, children),
        })
    }

    /// The traversal strategy in use
    pub fn traversal(&self) -> &dyn ItemTreeTraversal {
        self.traversal.as_ref()
    }

    fn conn(&self) -> &Connection {
        self.db.connection()
    }

    // ========== Item Operations ==========

    /// Get all items
    pub fn get_all(&self) -> Result<Vec<Item>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {ITEM_COLUMNS} FROM {} ORDER BY name",
            self.items_table
        ))?;
        let items = stmt
            .query_map([], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Get items by kind
    pub fn get_by_kind(&self, kind: ItemKind) -> Result<Vec<Item>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {ITEM_COLUMNS} FROM {} WHERE type = ?1 ORDER BY name",
            self.items_table
        ))?;
        let items = stmt
            .query_map([kind.as_str()], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    pub fn get_roles(&self) -> Result<Vec<Item>> {
        self.get_by_kind(ItemKind::Role)
    }

    pub fn get_permissions(&self) -> Result<Vec<Item>> {
        self.get_by_kind(ItemKind::Permission)
    }

    /// Get the items with the given names; unknown names are skipped
    pub fn get_by_names(&self, names: &[&str]) -> Result<Vec<Item>> {
        fetch_items_by_names(self.conn(), &self.items_table, names, None)
    }

    pub fn get_roles_by_names(&self, names: &[&str]) -> Result<Vec<Item>> {
        fetch_items_by_names(self.conn(), &self.items_table, names, Some(ItemKind::Role))
    }

    pub fn get_permissions_by_names(&self, names: &[&str]) -> Result<Vec<Item>> {
        fetch_items_by_names(self.conn(), &self.items_table, names, Some(ItemKind::Permission))
    }

    /// Get an item by name
    pub fn get(&self, name: &str) -> Result<Option<Item>> {
        self.conn()
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM {} WHERE name = ?1", self.items_table),
                [name],
                row_to_item,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get an item by name, only if it has the given kind
    fn get_of_kind(&self, name: &str, kind: ItemKind) -> Result<Option<Item>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM {} WHERE name = ?1 AND type = ?2",
                    self.items_table
                ),
                [name, kind.as_str()],
                row_to_item,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_role(&self, name: &str) -> Result<Option<Item>> {
        self.get_of_kind(name, ItemKind::Role)
    }

    pub fn get_permission(&self, name: &str) -> Result<Option<Item>> {
        self.get_of_kind(name, ItemKind::Permission)
    }

    /// Check whether an item exists
    pub fn exists(&self, name: &str) -> Result<bool> {
        self.row_exists(
            &format!("SELECT 1 AS item_exists FROM {} WHERE name = ?1", self.items_table),
            &[name],
        )
    }

    /// Check whether a role with this name exists
    pub fn role_exists(&self, name: &str) -> Result<bool> {
        self.row_exists(
            &format!(
                "SELECT 1 AS role_exists FROM {} WHERE name = ?1 AND type = ?2",
                self.items_table
            ),
            &[name, ItemKind::Role.as_str()],
        )
    }

    /// Insert an item. A duplicate name surfaces the engine's key violation.
    pub fn add(&self, item: &Item) -> Result<()> {
        tracing::debug!("Adding {} {}", item.kind, item.name);
        self.conn().execute(
            &format!(
                "INSERT INTO {} (name, type, description, ruleName, createdAt, updatedAt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.items_table
            ),
            params![
                item.name,
                item.kind.as_str(),
                item.description,
                item.rule_name,
                item.created_at,
                item.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Replace the item stored under `name`.
    ///
    /// When `item.name` differs the item is renamed: the new row is inserted,
    /// every edge is re-pointed and the old row deleted, in one transaction.
    /// Assignments are renamed separately through the assignments store.
    pub fn update(&self, name: &str, item: &Item) -> Result<()> {
        if item.name == name {
            tracing::debug!("Updating item {}", name);
            self.conn().execute(
                &format!(
                    "UPDATE {} SET type = ?2, description = ?3, ruleName = ?4, createdAt = ?5, updatedAt = ?6
                     WHERE name = ?1",
                    self.items_table
                ),
                params![
                    name,
                    item.kind.as_str(),
                    item.description,
                    item.rule_name,
                    item.created_at,
                    item.updated_at,
                ],
            )?;
            return Ok(());
        }

        tracing::debug!("Renaming item {} to {}", name, item.name);
        self.db.transaction(|conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO {items} (name, type, description, ruleName, createdAt, updatedAt)
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6
                     WHERE EXISTS (SELECT 1 FROM {items} WHERE name = ?7)",
                    items = self.items_table
                ),
                params![
                    item.name,
                    item.kind.as_str(),
                    item.description,
                    item.rule_name,
                    item.created_at,
                    item.updated_at,
                    name,
                ],
            )?;
            if inserted == 0 {
                return Ok(());
            }

            conn.execute(
                &format!("UPDATE {} SET parent = ?2 WHERE parent = ?1", self.children_table),
                [name, item.name.as_str()],
            )?;
            conn.execute(
                &format!("UPDATE {} SET child = ?2 WHERE child = ?1", self.children_table),
                [name, item.name.as_str()],
            )?;
            conn.execute(
                &format!("DELETE FROM {} WHERE name = ?1", self.items_table),
                [name],
            )?;
            Ok(())
        })
    }

    /// Remove an item with every edge and assignment referencing it
    pub fn remove(&self, name: &str) -> Result<()> {
        tracing::debug!("Removing item {}", name);
        self.db.transaction(|conn| {
            conn.execute(
                &format!("DELETE FROM {} WHERE parent = ?1 OR child = ?1", self.children_table),
                [name],
            )?;
            if let Some(assignments) = &self.assignments_table {
                conn.execute(&format!("DELETE FROM {assignments} WHERE itemName = ?1"), [name])?;
            }
            conn.execute(
                &format!("DELETE FROM {} WHERE name = ?1", self.items_table),
                [name],
            )?;
            Ok(())
        })
    }

    /// Delete all items and edges
    pub fn clear(&self) -> Result<()> {
        tracing::debug!("Clearing items");
        self.db.transaction(|conn| {
            conn.execute(&format!("DELETE FROM {}", self.children_table), [])?;
            conn.execute(&format!("DELETE FROM {}", self.items_table), [])?;
            Ok(())
        })
    }

    pub fn clear_roles(&self) -> Result<()> {
        self.clear_kind(ItemKind::Role)
    }

    pub fn clear_permissions(&self) -> Result<()> {
        self.clear_kind(ItemKind::Permission)
    }

    /// Delete every item of one kind with the edges and assignments touching them
    fn clear_kind(&self, kind: ItemKind) -> Result<()> {
        tracing::debug!("Clearing {} items", kind);
        let of_kind = format!("SELECT name FROM {} WHERE type = ?1", self.items_table);
        self.db.transaction(|conn| {
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE parent IN ({of_kind}) OR child IN ({of_kind})",
                    self.children_table
                ),
                [kind.as_str()],
            )?;
            if let Some(assignments) = &self.assignments_table {
                conn.execute(
                    &format!("DELETE FROM {assignments} WHERE itemName IN ({of_kind})"),
                    [kind.as_str()],
                )?;
            }
            conn.execute(
                &format!("DELETE FROM {} WHERE type = ?1", self.items_table),
                [kind.as_str()],
            )?;
            Ok(())
        })
    }

    // ========== Hierarchy Operations ==========

    /// All ancestors of an item
    pub fn get_parents(&self, name: &str) -> Result<Vec<Item>> {
        self.traversal.parent_rows(name)
    }

    /// Items linked to `name` by a single edge
    pub fn get_direct_children(&self, name: &str) -> Result<Vec<Item>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {ITEM_COLUMNS_ALIASED} FROM {} AS item_child
             INNER JOIN {} AS item ON item.name = item_child.child
             WHERE item_child.parent = ?1
             ORDER BY item.name",
            self.children_table, self.items_table
        ))?;
        let items = stmt
            .query_map([name], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// All descendants of an item
    pub fn get_all_children(&self, name: &str) -> Result<Vec<Item>> {
        self.traversal.children_rows(name)
    }

    pub fn get_all_child_roles(&self, name: &str) -> Result<Vec<Item>> {
        self.traversal.child_role_rows(name)
    }

    pub fn get_all_child_permissions(&self, name: &str) -> Result<Vec<Item>> {
        self.traversal.child_permission_rows(name)
    }

    /// Whether the item has at least one direct child
    pub fn has_children(&self, name: &str) -> Result<bool> {
        self.row_exists(
            &format!("SELECT 1 AS item_child_exists FROM {} WHERE parent = ?1", self.children_table),
            &[name],
        )
    }

    /// Whether `child` is a descendant of `parent` at any depth
    pub fn has_child(&self, parent: &str, child: &str) -> Result<bool> {
        self.traversal.has_child(parent, child)
    }

    /// Whether the edge `parent -> child` exists
    pub fn has_direct_child(&self, parent: &str, child: &str) -> Result<bool> {
        self.row_exists(
            &format!(
                "SELECT 1 AS item_child_exists FROM {} WHERE parent = ?1 AND child = ?2",
                self.children_table
            ),
            &[parent, child],
        )
    }

    /// Add an edge. Missing endpoints or a duplicate edge surface the
    /// engine's key violation.
    pub fn add_child(&self, parent: &str, child: &str) -> Result<()> {
        tracing::debug!("Adding child {} -> {}", parent, child);
        self.conn().execute(
            &format!("INSERT INTO {} (parent, child) VALUES (?1, ?2)", self.children_table),
            [parent, child],
        )?;
        Ok(())
    }

    pub fn remove_child(&self, parent: &str, child: &str) -> Result<()> {
        tracing::debug!("Removing child {} -> {}", parent, child);
        self.conn().execute(
            &format!("DELETE FROM {} WHERE parent = ?1 AND child = ?2", self.children_table),
            [parent, child],
        )?;
        Ok(())
    }

    /// Remove every direct edge leaving `parent`
    pub fn remove_children(&self, parent: &str) -> Result<()> {
        tracing::debug!("Removing children of {}", parent);
        self.conn().execute(
            &format!("DELETE FROM {} WHERE parent = ?1", self.children_table),
            [parent],
        )?;
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

/// Load items by name in bounded `IN (...)` batches, ordered by name.
///
/// `items_table` must already be quoted.
pub(crate) fn fetch_items_by_names<S: AsRef<str>>(
    conn: &Connection,
    items_table: &str,
    names: &[S],
    kind: Option<ItemKind>,
) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for chunk in names.chunks(MAX_BOUND_NAMES) {
        let kind_condition = if kind.is_some() { " AND type = ?" } else { "" };
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ITEM_COLUMNS} FROM {items_table} WHERE name IN ({}){kind_condition}",
            placeholders(chunk.len())
        ))?;
        let values = chunk
            .iter()
            .map(|name| name.as_ref())
            .chain(kind.map(|k| k.as_str()));
        let rows = stmt
            .query_map(params_from_iter(values), row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        items.extend(rows);
    }
    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}
