//! Iterative traversal for engines without recursive CTEs
//!
//! The edge list is read once per call and the closure is computed
//! in-process as a monotone fixpoint: a breadth-first walk that only ever
//! adds names to the visited set, so it stops after at most one visit per
//! item even when the edges accidentally form a cycle.

use std::collections::{HashMap, HashSet, VecDeque};
use rusqlite::Connection;
use crate::item::{Item, ItemKind};
use crate::storage::{fetch_items_by_names, quote_identifier};
use crate::Result;
use super::{ensure_item_name, ItemTreeTraversal};

/// Adjacency lists keyed by item name
type Adjacency = HashMap<String, Vec<String>>;

/// Traversal that walks the edge list in memory.
pub struct IterativeItemTreeTraversal<'a> {
    conn: &'a Connection,
    items_table: String,
    children_table: String,
}

impl<'a> IterativeItemTreeTraversal<'a> {
    pub fn new(conn: &'a Connection, items_table: &str, children_table: &str) -> Self {
        Self {
            conn,
            items_table: quote_identifier(items_table),
            children_table: quote_identifier(children_table),
        }
    }

    /// Load every edge, keyed by parent (`forward`) or by child.
    fn adjacency(&self, forward: bool) -> Result<Adjacency> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT parent, child FROM {} ORDER BY parent",
            self.children_table
        ))?;
        let edges = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut adjacency = Adjacency::new();
        for (parent, child) in edges {
            if forward {
                adjacency.entry(parent).or_default().push(child);
            } else {
                adjacency.entry(child).or_default().push(parent);
            }
        }
        Ok(adjacency)
    }

    fn rows(&self, name: &str, forward: bool, kind: Option<ItemKind>) -> Result<Vec<Item>> {
        ensure_item_name(name)?;
        let adjacency = self.adjacency(forward)?;

        let mut reached = Vec::new();
        walk(&adjacency, name, |found| {
            reached.push(found.to_string());
            true
        });
        if reached.is_empty() {
            return Ok(Vec::new());
        }

        let mut items = fetch_items_by_names(self.conn, &self.items_table, &reached, kind)?;
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }
}

/// Breadth-first walk from `start`.
///
/// `visit` sees every reachable name exactly once, never `start` itself, and
/// returns `false` to stop early.
fn walk<'e>(adjacency: &'e Adjacency, start: &'e str, mut visit: impl FnMut(&str) -> bool) {
    let mut seen: HashSet<&str> = HashSet::from([start]);
    let mut queue: VecDeque<&str> = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        let Some(next) = adjacency.get(current) else {
            continue;
        };
        for name in next.iter().map(String::as_str) {
            if seen.insert(name) {
                if !visit(name) {
                    return;
                }
                queue.push_back(name);
            }
        }
    }
}

impl ItemTreeTraversal for IterativeItemTreeTraversal<'_> {
    fn parent_rows(&self, name: &str) -> Result<Vec<Item>> {
        self.rows(name, false, None)
    }

    fn children_rows(&self, name: &str) -> Result<Vec<Item>> {
        self.rows(name, true, None)
    }

    fn descendant_rows_of_kind(&self, name: &str, kind: ItemKind) -> Result<Vec<Item>> {
        self.rows(name, true, Some(kind))
    }

    fn has_child(&self, parent_name: &str, child_name: &str) -> Result<bool> {
        ensure_item_name(parent_name)?;
        ensure_item_name(child_name)?;
        if parent_name == child_name {
            return Ok(false);
        }

        let adjacency = self.adjacency(true)?;
        let mut found = false;
        walk(&adjacency, parent_name, |name| {
            found = name == child_name;
            !found
        });
        Ok(found)
    }

    fn strategy_name(&self) -> &'static str {
        "iterative"
    }
}
