//! # rbac-store - RBAC persistence layer
//!
//! Relational storage for a role-based access control model.
//!
//! rbac-store provides:
//! - Items (roles and permissions) with parent/child relations forming a DAG
//! - Hierarchy traversal (ancestors, descendants, descendant roles/permissions)
//!   with one strategy per database dialect
//! - User assignments of items
//! - Schema creation and teardown for the three relations
//!
//! Access decisions, rule evaluation and cycle prevention belong to the
//! manager built on top of this crate.

pub mod item;
pub mod assignment;
pub mod config;
pub mod logging;
pub mod storage;
pub mod traversal;

// Re-exports for convenient access
pub use item::{Item, ItemKind};
pub use assignment::Assignment;
pub use config::{StoreConfig, TableNames};
pub use storage::{AssignmentsStore, Database, Dialect, ItemsStore, SchemaManager};
pub use traversal::ItemTreeTraversal;

/// Result type alias for rbac-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for rbac-store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Empty or malformed identifier passed to a schema or traversal operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Contradictory construction-time settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A key constraint checked by this layer rather than by the engine
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Stored `type` value that is neither `role` nor `permission`
    #[error("Unknown item kind: {0}")]
    UnknownItemKind(String),

    /// Engine error passed through unmodified, key violations included
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error is a primary-key or foreign-key violation.
    ///
    /// Engine errors are passed through untouched, so this inspects the
    /// underlying SQLite result code as well as constraints checked here.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Error::ConstraintViolation(_) => true,
            Error::Storage(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
