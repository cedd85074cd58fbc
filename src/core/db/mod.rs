/// Database Module
///
/// The database layer is split by concern:
/// - **Driver contract** (`driver.rs`): what a database client must provide
/// - **Drivers** (`postgres.rs`, `sqlite.rs`): the two built-in implementations
/// - **Values and cursors** (`value.rs`, `cursor.rs`, `record.rs`): owned result data
/// - **Query model** (`query.rs`): requests, results and reshaping
/// - **Connection management** (`connection.rs`): the `Connector` and its transaction scope
///
/// All operations use `ConnectorError` for error propagation.
pub mod connection;
pub mod cursor;
pub mod driver;
pub mod postgres;
pub mod query;
pub mod record;
pub mod sqlite;
pub mod value;

pub use connection::{Connector, TransactionScope};
pub use cursor::Cursor;
pub use driver::{Column, Driver, DriverConnection, ResultSet};
pub use query::{FetchMode, OutputMode, QueryRequest, QueryResult, ResultData, StatementType};
pub use record::Record;
pub use value::Value;
