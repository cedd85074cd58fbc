//! Logging setup.
//!
//! The library only emits `tracing` events. Applications that want them on
//! stderr can call `init_logging` once at startup.

use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "SQLCONNECTOR_LOG";

/// Installs a global fmt subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(filter))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Builds the event filter.
///
/// Priority: explicit filter > `SQLCONNECTOR_LOG` > `RUST_LOG` > default.
/// An explicit filter that fails to parse falls back to the default.
pub fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "sqlconnector=debug,postgres=warn,tokio_postgres=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "sqlconnector=info,postgres=warn,tokio_postgres=warn"
    }
}
