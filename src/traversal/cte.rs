//! Recursive CTE traversal
//!
//! A recursive auxiliary relation is seeded with the queried item and joined
//! against the children table until a step adds no rows. The outer query
//! joins the collected names back onto the items table, so every lookup is a
//! single round trip whatever the depth of the hierarchy.
//!
//! The recursive step is always joined with `UNION`: rows already collected
//! are not added again, so the fixpoint is reached even on cyclic edges.

use rusqlite::{params, Connection, OptionalExtension};
use crate::item::{row_to_item, Item, ItemKind, ITEM_COLUMNS_ALIASED};
use crate::storage::{quote_identifier, Dialect};
use crate::Result;
use super::{ensure_item_name, ItemTreeTraversal};

/// Which way the recursion follows the edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ancestors,
    Descendants,
}

impl Direction {
    /// `(cte name, cte column, column selected from edges, column joined on)`
    fn names(&self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            Direction::Ancestors => ("parent_of", "child_name", "parent", "child"),
            Direction::Descendants => ("child_of", "parent_name", "child", "parent"),
        }
    }
}

/// Traversal for engines with recursive common table expressions.
pub struct CteItemTreeTraversal<'a> {
    conn: &'a Connection,
    dialect: Dialect,
    items_table: String,
    children_table: String,
}

impl<'a> CteItemTreeTraversal<'a> {
    pub fn new(conn: &'a Connection, dialect: Dialect, items_table: &str, children_table: &str) -> Self {
        Self {
            conn,
            dialect,
            items_table: quote_identifier(items_table),
            children_table: quote_identifier(children_table),
        }
    }

    /// Build the statement. `?1` is always the queried item name.
    fn statement(&self, direction: Direction, outer_select: &str, outer_condition: &str) -> String {
        let (cte, column, selected, joined) = direction.names();
        format!(
            "{with} {cte}({column}) AS (
                SELECT name FROM {items} WHERE name = ?1
                UNION
                SELECT item_child_recursive.{selected}
                FROM {children} AS item_child_recursive
                INNER JOIN {cte} ON item_child_recursive.{joined} = {cte}.{column}
            )
            SELECT {outer_select} FROM {cte}
            LEFT JOIN {items} AS item ON item.name = {cte}.{column}
            WHERE item.name != ?1{outer_condition}",
            with = self.dialect.recursive_with_keyword(),
            items = self.items_table,
            children = self.children_table,
        )
    }

    fn rows_statement(&self, direction: Direction, kind_filter: bool) -> String {
        let condition = if kind_filter { " AND item.type = ?2" } else { "" };
        let mut sql = self.statement(
            direction,
            &format!("DISTINCT {ITEM_COLUMNS_ALIASED}"),
            condition,
        );
        sql.push_str(" ORDER BY item.name");
        sql
    }

    fn rows(&self, name: &str, direction: Direction, kind: Option<ItemKind>) -> Result<Vec<Item>> {
        ensure_item_name(name)?;
        let mut stmt = self
            .conn
            .prepare_cached(&self.rows_statement(direction, kind.is_some()))?;

        let items = match kind {
            Some(kind) => stmt
                .query_map(params![name, kind.as_str()], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map(params![name], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(items)
    }
}

impl ItemTreeTraversal for CteItemTreeTraversal<'_> {
    fn parent_rows(&self, name: &str) -> Result<Vec<Item>> {
        self.rows(name, Direction::Ancestors, None)
    }

    fn children_rows(&self, name: &str) -> Result<Vec<Item>> {
        self.rows(name, Direction::Descendants, None)
    }

    fn descendant_rows_of_kind(&self, name: &str, kind: ItemKind) -> Result<Vec<Item>> {
        self.rows(name, Direction::Descendants, Some(kind))
    }

    fn has_child(&self, parent_name: &str, child_name: &str) -> Result<bool> {
        ensure_item_name(parent_name)?;
        ensure_item_name(child_name)?;

        let sql = self.statement(
            Direction::Descendants,
            "1 AS item_child_exists",
            " AND item.name = ?2",
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let found = stmt
            .query_row(params![parent_name, child_name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn strategy_name(&self) -> &'static str {
        "cte"
    }
}
