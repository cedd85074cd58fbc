/// SQLite Driver
///
/// Implements the driver contract over `rusqlite`. The configured database
/// is a file path, or an in-memory database when none is given. SQL text may
/// hold several statements; they run in order.

use crate::config::ConnectionConfig;
use crate::core::db::driver::{Column, Driver, DriverConnection, ResultSet};
use crate::core::db::value::Value;
use crate::core::{ConnectorError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, Statement};

pub const MEMORY_DATABASE: &str = ":memory:";

/// Driver for SQLite databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>> {
        let path = config.database.as_deref().unwrap_or(MEMORY_DATABASE);
        let conn = if path == MEMORY_DATABASE {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| ConnectorError::Connection(format!("Failed to open '{}': {}", path, e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| ConnectorError::Connection(format!("Failed to configure '{}': {}", path, e)))?;

        Ok(Box::new(SqliteConnection { conn }))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

/// A live SQLite connection.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    fn begin_if_idle(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|e| ConnectorError::Execution(format!("Failed to begin transaction: {}", e)))?;
        }
        Ok(())
    }
}

impl DriverConnection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        self.begin_if_idle()?;

        // Every statement in the text runs; the last one supplies the result.
        let mut batch = Batch::new(&self.conn, sql);
        let mut result = ResultSet::default();
        while let Some(mut stmt) = batch
            .next()
            .map_err(|e| ConnectorError::Execution(format!("Failed to prepare statement: {}", e)))?
        {
            result = run_statement(&mut stmt)?;
        }
        Ok(result)
    }

    fn commit(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| ConnectorError::Commit(e.to_string()))
    }

    fn rollback(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| ConnectorError::Transaction(format!("Rollback failed: {}", e)))
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| ConnectorError::Connection(format!("Failed to close connection: {}", e)))
    }
}

fn run_statement(stmt: &mut Statement) -> Result<ResultSet> {
    let column_count = stmt.column_count();
    if column_count == 0 {
        let changed = stmt
            .execute([])
            .map_err(|e| ConnectorError::Execution(e.to_string()))?;
        return Ok(ResultSet::affected(changed as u64));
    }

    let columns: Vec<Column> = stmt
        .column_names()
        .into_iter()
        .map(Column::new)
        .collect();

    let rows = stmt
        .query_map([], |row| {
            (0..column_count)
                .map(|i| row.get_ref(i).map(decode_value))
                .collect::<rusqlite::Result<Vec<Value>>>()
        })
        .map_err(|e| ConnectorError::Execution(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ConnectorError::Execution(format!("Result processing failed: {}", e)))?;

    Ok(ResultSet::rows(columns, rows))
}

fn decode_value(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}
