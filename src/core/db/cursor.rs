/// Cursor Module
///
/// A `Cursor` is a client-side handle over the buffered result of one
/// executed statement. It can outlive the `execute` call that produced it
/// (when a caller asks to keep it open), but it is tied to its connection:
/// once the connection is closed, the cursor reports itself closed too.

use crate::core::db::driver::{Column, ResultSet};
use crate::core::db::value::Value;
use crate::core::{ConnectorError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Buffered cursor over a statement's result.
#[derive(Debug)]
pub struct Cursor {
    columns: Option<Vec<Column>>,
    pending: VecDeque<Vec<Value>>,
    row_count: u64,
    closed: bool,
    /// Shared with the owning session; flipped to `false` when it closes
    connection_open: Arc<AtomicBool>,
}

impl Cursor {
    /// Creates a cursor over a result set produced by a live connection.
    pub fn new(result: ResultSet, connection_open: Arc<AtomicBool>) -> Self {
        Cursor {
            columns: result.columns,
            pending: result.rows.into(),
            row_count: result.rows_affected,
            closed: false,
            connection_open,
        }
    }

    /// Column metadata, or `None` when the statement produced no result set.
    pub fn description(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    /// Column names in positional order.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Cursor` if the statement produced no result set.
    pub fn column_names(&self) -> Result<Vec<String>> {
        self.description()
            .map(|columns| columns.iter().map(|c| c.name.clone()).collect())
            .ok_or_else(ConnectorError::no_results)
    }

    /// Rows returned (queries) or rows affected (DML) by the statement.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Number of rows not yet fetched.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Fetches the next row, or `None` when the result is exhausted.
    pub fn fetch_one(&mut self) -> Result<Option<Vec<Value>>> {
        self.ensure_fetchable()?;
        Ok(self.pending.pop_front())
    }

    /// Fetches up to `size` rows.
    pub fn fetch_many(&mut self, size: usize) -> Result<Vec<Vec<Value>>> {
        self.ensure_fetchable()?;
        let take = size.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    /// Fetches every remaining row.
    pub fn fetch_all(&mut self) -> Result<Vec<Vec<Value>>> {
        self.ensure_fetchable()?;
        Ok(self.pending.drain(..).collect())
    }

    /// Closes the cursor and drops any unfetched rows.
    pub fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed || !self.connection_open.load(Ordering::Acquire)
    }

    fn ensure_fetchable(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ConnectorError::cursor_closed());
        }
        if self.columns.is_none() {
            return Err(ConnectorError::no_results());
        }
        Ok(())
    }
}
