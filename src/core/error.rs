/// Connector Error Module
///
/// This module defines the error taxonomy for the connector. Every fallible
/// operation returns `ConnectorError`, and driver errors are converted into
/// the variant that matches the step that failed (connect, execute, commit).
use thiserror::Error;

/// Error type for all connector operations.
///
/// The variants mirror the places a call can go wrong:
/// - Preconditions on connector state (no open connection)
/// - Driver failures while connecting, executing, committing or rolling back
/// - Malformed requests, rejected before any driver call
/// - Cursor misuse and configuration problems
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// An operation that needs an open connection was called without one
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The driver could not establish (or cleanly release) a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// The query request is malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// The driver failed to commit the current transaction
    #[error("Commit error: {0}")]
    Commit(String),

    /// The SQL statement itself failed (syntax, constraint violation, ...)
    #[error("Execution error: {0}")]
    Execution(String),

    /// Rolling back the current transaction failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A cursor was used after it was closed, or has nothing to fetch
    #[error("Cursor error: {0}")]
    Cursor(String),

    /// The requested driver kind is not supported
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConnectorError {
    /// The error returned by `close` and `execute` when nothing is open.
    pub fn no_connection() -> Self {
        ConnectorError::Precondition("there is no open connection".to_string())
    }

    pub fn cursor_closed() -> Self {
        ConnectorError::Cursor("cursor already closed".to_string())
    }

    pub fn no_results() -> Self {
        ConnectorError::Cursor("no results to fetch".to_string())
    }
}

/// Type alias for Result with `ConnectorError` as the error type.
pub type Result<T> = std::result::Result<T, ConnectorError>;
