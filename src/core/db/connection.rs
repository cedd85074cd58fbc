/// Connection Management Module
///
/// The `Connector` owns at most one live connection and mediates query
/// execution against it. Opening a new connection closes the previous one
/// first, so a connector never holds two handles at once.

use crate::config::ConnectionConfig;
use crate::core::db::cursor::Cursor;
use crate::core::db::driver::{self, Driver, DriverConnection};
use crate::core::db::query::{FetchMode, QueryRequest, QueryResult, ResultData, StatementType};
use crate::core::{ConnectorError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A live connection and the liveness flag its cursors watch.
struct Session {
    handle: Box<dyn DriverConnection>,
    driver_name: &'static str,
    open: Arc<AtomicBool>,
}

enum ConnectionState {
    Disconnected,
    Connected(Session),
}

/// Holds at most one database connection and runs queries on it.
///
/// # Examples
///
/// ```
/// use sqlconnector::{ConnectionConfig, Connector, QueryRequest};
///
/// let mut connector = Connector::new();
/// connector.open(ConnectionConfig::sqlite(":memory:"))?;
/// connector.execute(&QueryRequest::new("CREATE TABLE t (id INTEGER)").commit(true))?;
/// let records = connector
///     .execute(&QueryRequest::new("SELECT 1 AS id").return_records(true))?
///     .into_records()
///     .unwrap_or_default();
/// assert_eq!(records.len(), 1);
/// connector.close()?;
/// # Ok::<(), sqlconnector::ConnectorError>(())
/// ```
pub struct Connector {
    state: ConnectionState,
    /// Overrides the built-in driver lookup when set
    driver: Option<Box<dyn Driver>>,
    config: Option<ConnectionConfig>,
    last_commit_error: Option<ConnectorError>,
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector {
    /// Creates a connector that picks the driver from each config's `driver` field.
    pub fn new() -> Self {
        Connector {
            state: ConnectionState::Disconnected,
            driver: None,
            config: None,
            last_commit_error: None,
        }
    }

    /// Creates a connector that always connects through `driver`.
    pub fn with_driver(driver: Box<dyn Driver>) -> Self {
        Connector {
            driver: Some(driver),
            ..Connector::new()
        }
    }

    /// Opens a connection, closing any connection already held.
    ///
    /// The config is stored before connecting and stays available through
    /// `config()` even if the connection attempt fails.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Connection` if the driver cannot connect; the
    /// connector is then left without a connection.
    pub fn open(&mut self, config: ConnectionConfig) -> Result<()> {
        if self.is_connected() {
            self.close()?;
        }

        let built_in;
        let driver: &dyn Driver = match &self.driver {
            Some(driver) => driver.as_ref(),
            None => {
                built_in = driver::for_kind(config.driver);
                built_in.as_ref()
            }
        };
        let driver_name = driver.name();

        let config: &ConnectionConfig = self.config.insert(config);

        let handle = driver.connect(config).map_err(|e| {
            warn!(driver = driver_name, error = %e, "connection attempt failed");
            match e {
                ConnectorError::Connection(_) => e,
                other => ConnectorError::Connection(other.to_string()),
            }
        })?;

        info!(
            driver = driver_name,
            host = config.host.as_deref().unwrap_or("<default>"),
            database = config.database.as_deref().unwrap_or("<default>"),
            "connection opened"
        );

        self.state = ConnectionState::Connected(Session {
            handle,
            driver_name,
            open: Arc::new(AtomicBool::new(true)),
        });
        Ok(())
    }

    /// Closes the held connection.
    ///
    /// Cursors handed out from this connection become closed as well.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Precondition` if no connection is open, or
    /// `ConnectorError::Connection` if the driver fails to close it (the
    /// connector is disconnected either way).
    pub fn close(&mut self) -> Result<()> {
        let session = match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Connected(session) => session,
            ConnectionState::Disconnected => return Err(ConnectorError::no_connection()),
        };

        session.open.store(false, Ordering::Release);
        session.handle.close()?;

        info!(driver = session.driver_name, "connection closed");
        Ok(())
    }

    /// Executes a SQL statement on the held connection.
    ///
    /// The statement runs inside a transaction scope: it is committed when
    /// execution completes normally and rolled back when the statement fails.
    /// With `commit` set, an explicit commit follows the statement; if that
    /// commit fails it is logged, recorded in `last_commit_error`, and rolled
    /// back, and the call still succeeds.
    ///
    /// # Errors
    ///
    /// - `ConnectorError::Precondition` if no connection is open
    /// - `ConnectorError::Validation` if the request is malformed (checked first)
    /// - `ConnectorError::Execution` if the statement fails
    pub fn execute(&mut self, request: &QueryRequest) -> Result<QueryResult> {
        let session = match &mut self.state {
            ConnectionState::Connected(session) => session,
            ConnectionState::Disconnected => return Err(ConnectorError::no_connection()),
        };
        request.validate()?;

        let started = Instant::now();
        let statement_type = StatementType::from_sql(&request.sql);
        let liveness = Arc::clone(&session.open);

        let mut scope = TransactionScope::enter(session.handle.as_mut());
        let result_set = scope.connection().execute(&request.sql)?;
        let mut cursor = Cursor::new(result_set, liveness);

        if request.commit {
            match scope.connection().commit() {
                Ok(()) => scope.finish(),
                Err(e) => {
                    warn!(error = %e, "commit failed, rolling back");
                    self.last_commit_error = Some(e);
                    scope.rollback()?;
                }
            }

            debug!(
                ?statement_type,
                rows_affected = cursor.row_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "statement committed"
            );

            if request.return_cursor {
                return Ok(QueryResult::CommittedCursor(cursor));
            }
            cursor.close();
            return Ok(QueryResult::Committed);
        }

        let rows = match request.fetch {
            FetchMode::One => cursor.fetch_one()?.into_iter().collect(),
            FetchMode::All => cursor.fetch_all()?,
        };
        let columns = cursor.column_names()?;
        let data = ResultData::shape(columns, rows, request.output_mode())?;
        scope.exit()?;

        debug!(
            ?statement_type,
            fetch = %request.fetch,
            output = ?request.output_mode(),
            rows = data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query fetched"
        );

        if request.return_cursor {
            return Ok(QueryResult::Fetched {
                data,
                cursor: Some(cursor),
            });
        }
        cursor.close();
        Ok(QueryResult::Fetched { data, cursor: None })
    }

    /// Spelling of `open` matching the connection-helper API.
    pub fn open_connection(&mut self, config: ConnectionConfig) -> Result<()> {
        self.open(config)
    }

    /// Spelling of `close` matching the connection-helper API.
    pub fn close_connection(&mut self) -> Result<()> {
        self.close()
    }

    /// Spelling of `execute` matching the connection-helper API.
    pub fn execute_query(&mut self, request: &QueryRequest) -> Result<QueryResult> {
        self.execute(request)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    /// The config passed to the most recent `open`, kept after `close`.
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// Name of the driver behind the open connection.
    pub fn driver_name(&self) -> Option<&'static str> {
        match &self.state {
            ConnectionState::Connected(session) => Some(session.driver_name),
            ConnectionState::Disconnected => None,
        }
    }

    /// Whether the open connection has a transaction in progress.
    pub fn in_transaction(&self) -> bool {
        match &self.state {
            ConnectionState::Connected(session) => session.handle.in_transaction(),
            ConnectionState::Disconnected => false,
        }
    }

    /// The most recent commit failure that was recovered by a rollback.
    pub fn last_commit_error(&self) -> Option<&ConnectorError> {
        self.last_commit_error.as_ref()
    }
}

/// Transaction guard around one unit of work on a connection.
///
/// `exit` commits whatever is open. Dropping the guard without calling
/// `exit` rolls back, so an early `?` return leaves no transaction behind.
pub struct TransactionScope<'a> {
    conn: &'a mut dyn DriverConnection,
    finished: bool,
}

impl<'a> TransactionScope<'a> {
    pub fn enter(conn: &'a mut dyn DriverConnection) -> Self {
        TransactionScope {
            conn,
            finished: false,
        }
    }

    pub fn connection(&mut self) -> &mut dyn DriverConnection {
        &mut *self.conn
    }

    /// Normal exit: commit.
    pub fn exit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.commit()
    }

    /// Exit by rolling back.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.rollback()
    }

    /// Exit after the transaction was already settled through `connection()`.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.rollback() {
            error!(error = %e, "rollback after failed statement did not complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::driver::{Column, ResultSet};
    use crate::core::db::value::Value;
    use crate::test_utils::MockDriver;

    fn users_result() -> ResultSet {
        ResultSet::rows(
            vec![Column::new("id"), Column::new("name")],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ],
        )
    }

    fn connected(driver: &MockDriver) -> Connector {
        let mut connector = Connector::with_driver(Box::new(driver.clone()));
        connector
            .open(ConnectionConfig::postgres().with_database("test"))
            .unwrap();
        connector
    }

    #[test]
    fn test_close_without_connection() {
        let mut connector = Connector::new();
        match connector.close() {
            Err(ConnectorError::Precondition(msg)) => assert!(msg.contains("no open connection")),
            other => panic!("Expected Precondition error, got {:?}", other),
        }
    }

    #[test]
    fn test_execute_without_connection() {
        let mut connector = Connector::new();
        let result = connector.execute(&QueryRequest::new("SELECT 1"));
        assert!(matches!(result, Err(ConnectorError::Precondition(_))));
    }

    #[test]
    fn test_reopen_closes_previous_connection() {
        let driver = MockDriver::new();
        let mut connector = connected(&driver);
        connector
            .open(ConnectionConfig::postgres().with_database("second"))
            .unwrap();
        connector
            .open(ConnectionConfig::postgres().with_database("third"))
            .unwrap();

        assert_eq!(driver.max_live_connections(), 1);
        assert_eq!(driver.live_connections(), 1);
        assert_eq!(driver.count("connect"), 3);
        assert_eq!(driver.count("close"), 2);
        assert_eq!(connector.config().unwrap().database.as_deref(), Some("third"));
    }

    #[test]
    fn test_failed_open_leaves_connector_disconnected() {
        let driver = MockDriver::new();
        let mut connector = connected(&driver);
        driver.fail_connect(true);

        let result = connector.open(ConnectionConfig::postgres().with_database("broken"));
        assert!(matches!(result, Err(ConnectorError::Connection(_))));
        assert!(!connector.is_connected());
        assert_eq!(driver.live_connections(), 0);
        assert_eq!(connector.config().unwrap().database.as_deref(), Some("broken"));
    }

    #[test]
    fn test_close_releases_connection_and_keeps_config() {
        let driver = MockDriver::new();
        let mut connector = connected(&driver);
        assert_eq!(connector.driver_name(), Some("mock"));

        connector.close().unwrap();
        assert!(!connector.is_connected());
        assert_eq!(driver.live_connections(), 0);
        assert!(connector.driver_name().is_none());
        assert_eq!(connector.config().unwrap().database.as_deref(), Some("test"));
        assert!(matches!(connector.close(), Err(ConnectorError::Precondition(_))));
    }

    #[test]
    fn test_validation_happens_before_driver_calls() {
        let driver = MockDriver::new();
        let mut connector = connected(&driver);
        let request = QueryRequest::new("SELECT 1")
            .return_dataframe(true)
            .return_records(true);

        assert!(matches!(connector.execute(&request), Err(ConnectorError::Validation(_))));
        assert_eq!(driver.count("execute"), 0);
        assert_eq!(driver.count("commit"), 0);
    }

    #[test]
    fn test_fetch_one_with_no_rows() {
        let driver = MockDriver::new();
        driver.respond_with(ResultSet::rows(vec![Column::new("id")], Vec::new()));
        let mut connector = connected(&driver);

        let (columns, rows) = connector
            .execute(&QueryRequest::new("SELECT id FROM t").fetch(FetchMode::One))
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(columns, vec!["id"]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_fetch_one_returns_first_row() {
        let driver = MockDriver::new();
        driver.respond_with(users_result());
        let mut connector = connected(&driver);

        let (_, rows) = connector
            .execute(&QueryRequest::new("SELECT * FROM users").fetch(FetchMode::One))
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Int(1), Value::from("a")]]);
    }

    #[test]
    fn test_records_output() {
        let driver = MockDriver::new();
        driver.respond_with(users_result());
        let mut connector = connected(&driver);

        let records = connector
            .execute(&QueryRequest::new("SELECT * FROM users").return_records(true))
            .unwrap()
            .into_records()
            .unwrap();
        let json = serde_json::to_value(&records).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])
        );
        assert_eq!(records[0].columns().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn test_read_path_commits_on_scope_exit() {
        let driver = MockDriver::new();
        driver.respond_with(users_result());
        let mut connector = connected(&driver);

        connector.execute(&QueryRequest::new("SELECT * FROM users")).unwrap();
        assert_eq!(driver.calls(), vec!["connect", "execute", "commit"]);
        assert!(!connector.in_transaction());
    }

    #[test]
    fn test_commit_failure_rolls_back_and_returns_normally() {
        let driver = MockDriver::new();
        driver.fail_commits(1);
        let mut connector = connected(&driver);

        let result = connector
            .execute(&QueryRequest::new("INSERT INTO t VALUES (1)").commit(true))
            .unwrap();
        assert!(matches!(result, QueryResult::Committed));
        assert_eq!(
            driver.calls(),
            vec!["connect", "execute", "commit", "rollback"]
        );
        assert!(matches!(connector.last_commit_error(), Some(ConnectorError::Commit(_))));
    }

    #[test]
    fn test_commit_branch_commits_once() {
        let driver = MockDriver::new();
        let mut connector = connected(&driver);

        connector
            .execute(&QueryRequest::new("INSERT INTO t VALUES (1)").commit(true))
            .unwrap();
        assert_eq!(driver.calls(), vec!["connect", "execute", "commit"]);
        assert!(connector.last_commit_error().is_none());
    }

    #[test]
    fn test_recovered_commit_failure_does_not_commit_again() {
        let driver = MockDriver::new();
        driver.fail_commits(2);
        let mut connector = connected(&driver);

        let result = connector
            .execute(&QueryRequest::new("INSERT INTO t VALUES (1)").commit(true))
            .unwrap();
        assert!(matches!(result, QueryResult::Committed));
        assert_eq!(driver.count("commit"), 1);
        assert_eq!(driver.count("rollback"), 1);
        assert!(!connector.in_transaction());

        // The second injected failure is still pending and hits the next commit
        connector
            .execute(&QueryRequest::new("INSERT INTO t VALUES (2)").commit(true))
            .unwrap();
        assert_eq!(driver.count("commit"), 2);
        assert_eq!(driver.count("rollback"), 2);
    }

    #[test]
    fn test_commit_failure_with_cursor_still_returns_cursor() {
        let driver = MockDriver::new();
        driver.fail_commits(1);
        let mut connector = connected(&driver);

        let result = connector
            .execute(
                &QueryRequest::new("INSERT INTO t VALUES (1)")
                    .commit(true)
                    .return_cursor(true),
            )
            .unwrap();
        match result {
            QueryResult::CommittedCursor(cursor) => assert!(!cursor.is_closed()),
            other => panic!("Expected cursor, got {:?}", other),
        }
        assert_eq!(driver.count("rollback"), 1);
    }

    #[test]
    fn test_execution_error_propagates_after_scope_rollback() {
        let driver = MockDriver::new();
        driver.fail_execute(true);
        let mut connector = connected(&driver);

        let result = connector.execute(&QueryRequest::new("SELEC nonsense").commit(true));
        assert!(matches!(result, Err(ConnectorError::Execution(_))));
        assert_eq!(driver.calls(), vec!["connect", "execute", "rollback"]);
        assert!(connector.last_commit_error().is_none());
        assert!(connector.is_connected());
    }

    #[test]
    fn test_return_cursor_on_read_path() {
        let driver = MockDriver::new();
        driver.respond_with(users_result());
        let mut connector = connected(&driver);

        let mut result = connector
            .execute(
                &QueryRequest::new("SELECT * FROM users")
                    .fetch(FetchMode::One)
                    .return_cursor(true),
            )
            .unwrap();
        let cursor = result.cursor_mut().unwrap();
        assert!(!cursor.is_closed());
        // fetch=one leaves the rest of the result on the cursor
        assert_eq!(cursor.fetch_all().unwrap(), vec![vec![Value::Int(2), Value::from("b")]]);

        connector.close().unwrap();
        assert!(result.cursor().unwrap().is_closed());
    }

    #[test]
    fn test_commit_without_cursor_returns_nothing() {
        let driver = MockDriver::new();
        let mut connector = connected(&driver);
        let result = connector
            .execute(&QueryRequest::new("DELETE FROM t").commit(true))
            .unwrap();
        assert!(matches!(result, QueryResult::Committed));
        assert!(result.cursor().is_none());
    }

    #[test]
    fn test_read_of_statement_without_result_set() {
        let driver = MockDriver::new();
        driver.respond_with(ResultSet::affected(2));
        let mut connector = connected(&driver);

        let result = connector.execute(&QueryRequest::new("UPDATE t SET x = 1"));
        assert!(matches!(result, Err(ConnectorError::Cursor(_))));
        assert_eq!(driver.calls(), vec!["connect", "execute", "rollback"]);
    }

    #[test]
    fn test_rollback_failure_after_commit_failure_propagates() {
        let driver = MockDriver::new();
        driver.fail_commits(1);
        driver.fail_rollback(true);
        let mut connector = connected(&driver);

        let result = connector.execute(&QueryRequest::new("INSERT INTO t VALUES (1)").commit(true));
        assert!(matches!(result, Err(ConnectorError::Transaction(_))));
    }

    #[test]
    fn test_connection_helper_spellings() {
        let driver = MockDriver::new();
        driver.respond_with(users_result());
        let mut connector = Connector::with_driver(Box::new(driver.clone()));
        connector.open_connection(ConnectionConfig::postgres()).unwrap();
        let result = connector.execute_query(&QueryRequest::new("SELECT * FROM users")).unwrap();
        assert_eq!(result.data().unwrap().len(), 2);
        connector.close_connection().unwrap();
        assert_eq!(driver.live_connections(), 0);
    }
}
