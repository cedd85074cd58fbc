/// Query Model Module
///
/// Describes what a caller asks `Connector::execute` to do (`QueryRequest`)
/// and what comes back (`QueryResult`), plus the reshaping of fetched rows
/// into a data frame or records.

use crate::core::db::cursor::Cursor;
use crate::core::db::record::Record;
use crate::core::db::value::Value;
use crate::core::{ConnectorError, Result};
use crate::dataframe::DataFrame;
use std::fmt;
use std::str::FromStr;

/// How many rows to fetch from a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Only the first row
    One,
    /// Every remaining row
    #[default]
    All,
}

impl FromStr for FetchMode {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one" => Ok(FetchMode::One),
            "all" => Ok(FetchMode::All),
            other => Err(ConnectorError::Validation(format!(
                "fetch must be 'one' or 'all', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMode::One => f.write_str("one"),
            FetchMode::All => f.write_str("all"),
        }
    }
}

/// Shape of the fetched data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Rows,
    DataFrame,
    Records,
}

/// A SQL statement plus instructions for running it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub sql: String,
    /// Commit after executing, and skip fetching
    pub commit: bool,
    pub fetch: FetchMode,
    pub return_dataframe: bool,
    pub return_records: bool,
    /// Hand the open cursor back to the caller
    pub return_cursor: bool,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        QueryRequest {
            sql: sql.into(),
            commit: false,
            fetch: FetchMode::All,
            return_dataframe: false,
            return_records: false,
            return_cursor: false,
        }
    }

    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn fetch(mut self, fetch: FetchMode) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn return_dataframe(mut self, enabled: bool) -> Self {
        self.return_dataframe = enabled;
        self
    }

    pub fn return_records(mut self, enabled: bool) -> Self {
        self.return_records = enabled;
        self
    }

    pub fn return_cursor(mut self, enabled: bool) -> Self {
        self.return_cursor = enabled;
        self
    }

    /// Checks the request before anything touches the connection.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Validation` if both a data frame and records
    /// are requested.
    pub fn validate(&self) -> Result<()> {
        if self.return_dataframe && self.return_records {
            return Err(ConnectorError::Validation(
                "return_dataframe and return_records cannot both be set to true".to_string(),
            ));
        }
        Ok(())
    }

    /// The output shape implied by the flags. Records win if both are set;
    /// `validate` rejects that combination first.
    pub fn output_mode(&self) -> OutputMode {
        if self.return_records {
            OutputMode::Records
        } else if self.return_dataframe {
            OutputMode::DataFrame
        } else {
            OutputMode::Rows
        }
    }
}

/// Fetched data in the requested shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultData {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    DataFrame(DataFrame),
    Records(Vec<Record>),
}

impl ResultData {
    /// Reshapes fetched rows according to the output mode.
    pub fn shape(
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        mode: OutputMode,
    ) -> Result<Self> {
        match mode {
            OutputMode::Rows => Ok(ResultData::Rows { columns, rows }),
            OutputMode::DataFrame => Ok(ResultData::DataFrame(DataFrame::new(columns, rows)?)),
            OutputMode::Records => Ok(ResultData::Records(to_records(&columns, rows))),
        }
    }

    /// Number of rows, whatever the shape.
    pub fn len(&self) -> usize {
        match self {
            ResultData::Rows { rows, .. } => rows.len(),
            ResultData::DataFrame(frame) => frame.height(),
            ResultData::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pairs every row with the column names, keeping row and column order.
pub fn to_records(columns: &[String], rows: Vec<Vec<Value>>) -> Vec<Record> {
    rows.into_iter()
        .map(|row| Record::from_row(columns, row))
        .collect()
}

/// Outcome of `Connector::execute`.
#[derive(Debug)]
pub enum QueryResult {
    /// Commit path, cursor closed
    Committed,
    /// Commit path, cursor handed to the caller
    CommittedCursor(Cursor),
    /// Read path; the cursor is present only when requested
    Fetched {
        data: ResultData,
        cursor: Option<Cursor>,
    },
}

impl QueryResult {
    pub fn data(&self) -> Option<&ResultData> {
        match self {
            QueryResult::Fetched { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            QueryResult::CommittedCursor(cursor) => Some(cursor),
            QueryResult::Fetched { cursor, .. } => cursor.as_ref(),
            QueryResult::Committed => None,
        }
    }

    pub fn cursor_mut(&mut self) -> Option<&mut Cursor> {
        match self {
            QueryResult::CommittedCursor(cursor) => Some(cursor),
            QueryResult::Fetched { cursor, .. } => cursor.as_mut(),
            QueryResult::Committed => None,
        }
    }

    pub fn into_parts(self) -> (Option<ResultData>, Option<Cursor>) {
        match self {
            QueryResult::Committed => (None, None),
            QueryResult::CommittedCursor(cursor) => (None, Some(cursor)),
            QueryResult::Fetched { data, cursor } => (Some(data), cursor),
        }
    }

    /// The raw rows, if the request asked for neither a frame nor records.
    pub fn into_rows(self) -> Option<(Vec<String>, Vec<Vec<Value>>)> {
        match self.into_parts().0 {
            Some(ResultData::Rows { columns, rows }) => Some((columns, rows)),
            _ => None,
        }
    }

    pub fn into_dataframe(self) -> Option<DataFrame> {
        match self.into_parts().0 {
            Some(ResultData::DataFrame(frame)) => Some(frame),
            _ => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self.into_parts().0 {
            Some(ResultData::Records(records)) => Some(records),
            _ => None,
        }
    }
}

/// Statement categories, used to label executions in logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    /// CREATE / ALTER / DROP / TRUNCATE
    Ddl,
    /// BEGIN / COMMIT / ROLLBACK and friends
    Transaction,
    Other,
}

impl StatementType {
    /// Classifies a statement by its leading keyword.
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
            .next()
            .unwrap_or("")
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" | "SHOW" | "EXPLAIN" => StatementType::Select,
            "INSERT" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" => StatementType::Ddl,
            "BEGIN" | "START" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementType::Transaction
            }
            _ => StatementType::Other,
        }
    }
}
