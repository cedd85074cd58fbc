//! Driver contract.
//!
//! The connector never talks to a database client directly. It goes through
//! these two traits, which cover exactly what it needs: connect, execute a
//! statement into an owned `ResultSet`, commit, roll back, close.

use crate::config::{ConnectionConfig, DriverKind};
use crate::core::db::value::Value;
use crate::core::Result;

/// A database client able to open connections.
pub trait Driver: Send {
    /// Open a new connection using the supplied configuration.
    ///
    /// Failures are reported as `ConnectorError::Connection`.
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>>;

    /// Driver name for logging.
    fn name(&self) -> &'static str;
}

/// A live connection owned by the connector.
///
/// Connections behave as if autocommit were off: the first statement opens a
/// transaction, which stays open until `commit` or `rollback`.
pub trait DriverConnection: Send {
    /// Execute a single SQL statement and buffer its result.
    ///
    /// Failures are reported as `ConnectorError::Execution`.
    fn execute(&mut self, sql: &str) -> Result<ResultSet>;

    /// Commit the open transaction. A no-op when none is open.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction. A no-op when none is open.
    fn rollback(&mut self) -> Result<()>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;

    /// Release the connection.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Result column metadata, one entry per column in positional order.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Database type name when the driver reports one
    pub type_name: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            type_name: None,
        }
    }

    pub fn with_type(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            type_name: Some(type_name.into()),
        }
    }
}

/// The buffered outcome of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// `None` when the statement produces no result set (DDL, plain DML)
    pub columns: Option<Vec<Column>>,
    pub rows: Vec<Vec<Value>>,
    /// Rows returned for queries, rows touched for DML
    pub rows_affected: u64,
}

impl ResultSet {
    /// A result set with columns and rows.
    pub fn rows(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let rows_affected = rows.len() as u64;
        ResultSet {
            columns: Some(columns),
            rows,
            rows_affected,
        }
    }

    /// The outcome of a statement without a result set.
    pub fn affected(rows_affected: u64) -> Self {
        ResultSet {
            columns: None,
            rows: Vec::new(),
            rows_affected,
        }
    }
}

/// Returns the built-in driver for a driver kind.
pub fn for_kind(kind: DriverKind) -> Box<dyn Driver> {
    match kind {
        DriverKind::Postgres => Box::new(super::postgres::PostgresDriver),
        DriverKind::Sqlite => Box::new(super::sqlite::SqliteDriver),
    }
}
