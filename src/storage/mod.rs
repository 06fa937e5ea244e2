//! Storage Layer - SQL-backed persistence
//!
//! Three relations, names configurable through [`TableNames`](crate::TableNames):
//! - item(name, type, description, ruleName, createdAt, updatedAt)
//! - item_child(parent, child)
//! - assignment(itemName, userId, createdAt)

pub mod assignments;
pub mod dialect;
pub mod items;
pub mod schema;
pub mod sqlite;

pub use assignments::AssignmentsStore;
pub use dialect::Dialect;
pub use items::ItemsStore;
pub use schema::{SchemaManager, TableSchema};
pub use sqlite::Database;

pub(crate) use items::fetch_items_by_names;
pub(crate) use sqlite::{placeholders, quote_identifier, MAX_BOUND_NAMES};
