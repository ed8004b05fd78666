//! Warehouse access: SQL in, tabular result out.
//!
//! Every caller (fetcher, analyst proxy, loitering detector) goes through
//! the [`Warehouse`] trait, so the read-only guarantee is enforced in one
//! place.

pub mod schema;
pub mod sqlite;

use imint::{ImintError, QueryResult};

pub use sqlite::SqliteWarehouse;

/// Errors raised at the warehouse boundary.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("cannot open warehouse {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("warehouse I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("statement rejected, warehouse access is read-only: {0}")]
    ReadOnly(String),

    #[error("query failed: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("malformed result: {0}")]
    Result(#[from] ImintError),

    #[error("warehouse connection poisoned by an earlier panic")]
    Poisoned,
}

/// A read-only SQL endpoint.
pub trait Warehouse: Send + Sync {
    /// Run one read-only statement and collect its rows.
    fn query(&self, sql: &str) -> Result<QueryResult, WarehouseError>;
}

/// Quote a string as a SQL literal.
pub fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
