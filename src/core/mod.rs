/// Core Module
///
/// The connector itself, the driver contract and the drivers, plus the
/// error type shared by everything in the crate.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{ConnectorError, Result};
