//! SQLite connection handle shared by the stores

use std::path::Path;
use rusqlite::{Connection, OptionalExtension};
use crate::config::{ensure_db_dir, StoreConfig};
use crate::{Error, Result};
use super::dialect::Dialect;

/// Connection plus the dialect the stores generate SQL for.
///
/// Holds no cached data: every store call re-reads the tables.
pub struct Database {
    conn: Connection,
    dialect: Dialect,
}

impl Database {
    /// Open a database file (creates if doesn't exist), detecting the dialect
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let dialect = Dialect::detect(&conn)?;
        Self::with_connection(conn, dialect)
    }

    /// Open a database file, generating SQL for `dialect`
    pub fn open_with_dialect(path: &Path, dialect: Dialect) -> Result<Self> {
        Self::with_connection(Connection::open(path)?, dialect)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let dialect = Dialect::detect(&conn)?;
        Self::with_connection(conn, dialect)
    }

    pub fn open_in_memory_with_dialect(dialect: Dialect) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, dialect)
    }

    /// Open the database named by a config, creating its directory
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let path = config.database.as_deref().ok_or_else(|| {
            Error::InvalidConfiguration("Database path is not set".to_string())
        })?;
        let path = Path::new(path);
        ensure_db_dir(path)?;

        match config.dialect {
            Some(dialect) => Self::open_with_dialect(path, dialect),
            None => Self::open(path),
        }
    }

    /// Wrap an existing connection
    pub fn with_connection(conn: Connection, dialect: Dialect) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        tracing::debug!("Opened database with dialect {}", dialect);
        Ok(Self { conn, dialect })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Check whether a table exists
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Drop a table if it exists
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_identifier(name)), [])?;
        Ok(())
    }

    /// Run `f` inside a savepoint, releasing it on success.
    ///
    /// Work done by `f` is rolled back when it fails. Outside any transaction
    /// the savepoint behaves like `BEGIN`/`COMMIT`; inside one opened by the
    /// caller it nests, and the caller keeps control of the final commit.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT_NAME}"))?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {SAVEPOINT_NAME}"))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch(&format!(
                    "ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME}"
                )) {
                    tracing::warn!("Failed to roll back savepoint: {}", rollback);
                }
                Err(err)
            }
        }
    }

    /// Count rows of a table
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

const SAVEPOINT_NAME: &str = "rbac_store";

/// Upper bound on names bound into one `IN (...)` list.
pub(crate) const MAX_BOUND_NAMES: usize = 500;

/// `?, ?, ?` for `count` parameters
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Double-quote an identifier, doubling embedded quotes.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
