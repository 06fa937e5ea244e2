//! SQL dialects and their hierarchy-query capabilities

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Error, Result};

/// First SQLite release with `WITH RECURSIVE` support.
const SQLITE_CTE_VERSION: (u32, u32, u32) = (3, 8, 3);

/// Target engine family.
///
/// Only decides which traversal strategy and CTE syntax are generated;
/// statements run through the same connection either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    /// MySQL 8 and later
    Mysql,
    /// MySQL 5.x and other engines without recursive CTEs
    MysqlLegacy,
    SqlServer,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::MysqlLegacy => "mysqllegacy",
            Dialect::SqlServer => "sqlserver",
        }
    }

    pub fn all() -> &'static [Dialect] {
        &[
            Dialect::Sqlite,
            Dialect::Postgres,
            Dialect::Mysql,
            Dialect::MysqlLegacy,
            Dialect::SqlServer,
        ]
    }

    pub fn supports_recursive_cte(&self) -> bool {
        !matches!(self, Dialect::MysqlLegacy)
    }

    /// Keyword opening a recursive common table expression
    pub fn recursive_with_keyword(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "WITH",
            _ => "WITH RECURSIVE",
        }
    }

    /// Work out the capability of the engine behind `conn`.
    pub fn detect(conn: &Connection) -> Result<Self> {
        let version: String = conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
        let dialect = if parse_version(&version) >= SQLITE_CTE_VERSION {
            Dialect::Sqlite
        } else {
            Dialect::MysqlLegacy
        };
        tracing::debug!("Detected dialect {} from SQLite {}", dialect, version);
        Ok(dialect)
    }
}

fn parse_version(version: &str) -> (u32, u32, u32) {
    let mut parts = version
        .split('.')
        .map(|part| part.trim().parse::<u32>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pgsql" => Ok(Dialect::Postgres),
            "mysql" | "mysql8" | "mariadb" => Ok(Dialect::Mysql),
            "mysqllegacy" | "mysql5" => Ok(Dialect::MysqlLegacy),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            _ => Err(Error::InvalidConfiguration(format!("Unknown dialect: {}", s))),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
