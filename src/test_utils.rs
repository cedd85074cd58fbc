/// # Test Utilities Module
///
/// Shared fixtures for the unit and integration tests:
/// - `MockDriver`, a scripted driver that records every call and can be told
///   to fail at connect, execute, commit or rollback
/// - `ConnectorFixture`, a connector opened on an in-memory SQLite database
///   with a small sample schema
/// - error assertion helpers

use crate::config::ConnectionConfig;
use crate::core::db::driver::{Driver, DriverConnection, ResultSet};
use crate::core::db::{Connector, QueryRequest};
use crate::core::{ConnectorError, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<&'static str>,
    live: usize,
    max_live: usize,
    fail_connect: bool,
    fail_execute: bool,
    commit_failures: usize,
    fail_rollback: bool,
    response: ResultSet,
}

/// Scripted driver. Clones share state, so a test can keep one handle while
/// the connector owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        MockDriver::default()
    }

    /// Result set returned by every subsequent `execute`.
    pub fn respond_with(&self, response: ResultSet) {
        self.state.lock().unwrap().response = response;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub fn fail_execute(&self, fail: bool) {
        self.state.lock().unwrap().fail_execute = fail;
    }

    /// The next `count` commits fail.
    pub fn fail_commits(&self, count: usize) {
        self.state.lock().unwrap().commit_failures = count;
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.state.lock().unwrap().fail_rollback = fail;
    }

    /// Every driver call so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    pub fn live_connections(&self) -> usize {
        self.state.lock().unwrap().live
    }

    /// Highest number of connections ever open at the same time.
    pub fn max_live_connections(&self) -> usize {
        self.state.lock().unwrap().max_live
    }
}

impl Driver for MockDriver {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("connect");
        if state.fail_connect {
            return Err(ConnectorError::Connection(
                "could not connect to server: Connection refused".to_string(),
            ));
        }
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            in_transaction: false,
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    in_transaction: bool,
}

impl DriverConnection for MockConnection {
    fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("execute");
        if state.fail_execute {
            return Err(ConnectorError::Execution(format!(
                "syntax error in statement: {}",
                sql
            )));
        }
        self.in_transaction = true;
        Ok(state.response.clone())
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("commit");
        if state.commit_failures > 0 {
            state.commit_failures -= 1;
            return Err(ConnectorError::Commit(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("rollback");
        if state.fail_rollback {
            return Err(ConnectorError::Transaction("server closed the connection".to_string()));
        }
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn close(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("close");
        state.live = state.live.saturating_sub(1);
        Ok(())
    }
}

/// A connector opened on an in-memory SQLite database.
pub struct ConnectorFixture {
    pub connector: Connector,
}

impl ConnectorFixture {
    pub fn new() -> Result<Self> {
        let mut connector = Connector::new();
        connector.open(ConnectionConfig::sqlite(":memory:"))?;
        Ok(ConnectorFixture { connector })
    }

    /// Fixture with `users` and `posts` tables and a few committed rows.
    pub fn with_sample_data() -> Result<Self> {
        let mut fixture = Self::new()?;
        for sql in [
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT,
                score REAL
            )",
            "CREATE TABLE posts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users (id),
                title TEXT NOT NULL
            )",
            "INSERT INTO users (id, username, email, score) VALUES
                (1, 'alice', 'alice@example.com', 9.5),
                (2, 'bob', NULL, 7.25),
                (3, 'charlie', 'charlie@example.com', NULL)",
            "INSERT INTO posts (user_id, title) VALUES
                (1, 'Welcome to Rust'),
                (2, 'My Trip to Paris'),
                (1, 'Building Connectors')",
        ] {
            fixture.run(sql)?;
        }
        Ok(fixture)
    }

    /// Executes and commits a statement.
    pub fn run(&mut self, sql: &str) -> Result<()> {
        self.connector.execute(&QueryRequest::new(sql).commit(true))?;
        Ok(())
    }
}

/// Error assertion helpers.
pub mod error_testing {
    /// Asserts the call failed and its message contains `fragment` (case-insensitive).
    pub fn assert_error_contains<T, E>(
        result: &std::result::Result<T, E>,
        fragment: &str,
        context: &str,
    ) where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => panic!("Expected error but got Ok in {}", context),
            Err(e) => {
                let message = e.to_string();
                assert!(
                    message.to_lowercase().contains(&fragment.to_lowercase()),
                    "Expected '{}' in error message '{}' context: {}",
                    fragment,
                    message,
                    context
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_driver_tracks_live_connections() {
        let driver = MockDriver::new();
        let first = driver.connect(&ConnectionConfig::default()).unwrap();
        let second = driver.connect(&ConnectionConfig::default()).unwrap();
        assert_eq!(driver.live_connections(), 2);
        first.close().unwrap();
        second.close().unwrap();
        assert_eq!(driver.live_connections(), 0);
        assert_eq!(driver.max_live_connections(), 2);
        assert_eq!(driver.calls(), vec!["connect", "connect", "close", "close"]);
    }

    #[test]
    fn test_mock_commit_failures_are_counted() {
        let driver = MockDriver::new();
        driver.fail_commits(1);
        let mut conn = driver.connect(&ConnectionConfig::default()).unwrap();
        conn.execute("SELECT 1").unwrap();
        assert!(conn.in_transaction());
        assert!(matches!(conn.commit(), Err(ConnectorError::Commit(_))));
        assert!(conn.commit().is_ok());
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_sample_data_fixture() {
        let mut fixture = ConnectorFixture::with_sample_data().unwrap();
        let (_, rows) = fixture
            .connector
            .execute(&QueryRequest::new("SELECT COUNT(*) FROM users"))
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows[0][0].as_i64(), Some(3));
    }
}
