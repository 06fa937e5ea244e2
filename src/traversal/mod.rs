//! Item tree traversal - hierarchy queries over the children table
//!
//! Two interchangeable strategies answer the same questions:
//! - [`CteItemTreeTraversal`]: one recursive common table expression per call
//! - [`IterativeItemTreeTraversal`]: for engines without recursive CTEs, loads
//!   the edge list and runs the fixpoint in-process
//!
//! The strategy is picked once from the [`Dialect`] when a store is built.
//! Results never contain the queried item, hold each item once and are
//! ordered by name.

pub mod cte;
pub mod iterative;

pub use cte::CteItemTreeTraversal;
pub use iterative::IterativeItemTreeTraversal;

use rusqlite::Connection;
use crate::item::{Item, ItemKind};
use crate::storage::Dialect;
use crate::{Error, Result};

/// Hierarchy lookups for one items/children table pair.
pub trait ItemTreeTraversal {
    /// All ancestors of `name`: parents, grandparents and so on.
    fn parent_rows(&self, name: &str) -> Result<Vec<Item>>;

    /// All descendants of `name`.
    fn children_rows(&self, name: &str) -> Result<Vec<Item>>;

    /// Descendants of `name` that are permissions.
    fn child_permission_rows(&self, name: &str) -> Result<Vec<Item>> {
        self.descendant_rows_of_kind(name, ItemKind::Permission)
    }

    /// Descendants of `name` that are roles.
    fn child_role_rows(&self, name: &str) -> Result<Vec<Item>> {
        self.descendant_rows_of_kind(name, ItemKind::Role)
    }

    fn descendant_rows_of_kind(&self, name: &str, kind: ItemKind) -> Result<Vec<Item>>;

    /// Whether `child_name` is reachable from `parent_name`.
    fn has_child(&self, parent_name: &str, child_name: &str) -> Result<bool>;

    /// Short label for logs
    fn strategy_name(&self) -> &'static str;
}

/// Pick the traversal strategy for `dialect`.
pub fn for_dialect<'a>(
    dialect: Dialect,
    conn: &'a Connection,
    items_table: &str,
    children_table: &str,
) -> Box<dyn ItemTreeTraversal + 'a> {
    let traversal: Box<dyn ItemTreeTraversal + 'a> = if dialect.supports_recursive_cte() {
        Box::new(CteItemTreeTraversal::new(conn, dialect, items_table, children_table))
    } else {
        Box::new(IterativeItemTreeTraversal::new(conn, items_table, children_table))
    };
    tracing::debug!(
        "Using {} item tree traversal for dialect {}",
        traversal.strategy_name(),
        dialect
    );
    traversal
}

pub(crate) fn ensure_item_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("Item name must be non-empty".to_string()));
    }
    Ok(())
}
