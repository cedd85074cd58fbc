// Core infrastructure modules
pub mod config;
pub mod core;
pub mod logging;

// Result shaping
pub mod dataframe;

#[cfg(test)]
mod test_utils;

// Re-export the public surface at the crate root
pub use crate::config::{ConnectionConfig, DriverKind, Settings};
pub use crate::core::db::{
    Connector, Cursor, FetchMode, OutputMode, QueryRequest, QueryResult, Record, ResultData,
    Value,
};
pub use crate::core::{ConnectorError, Result};
pub use crate::dataframe::{DataFrame, ExportFormat};
