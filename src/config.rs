use crate::core::{ConnectorError, Result};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which database client to connect with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    #[default]
    Postgres,
    Sqlite,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Postgres => "postgres",
            DriverKind::Sqlite => "sqlite",
        }
    }
}

impl FromStr for DriverKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DriverKind::Postgres),
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            other => Err(ConnectorError::UnsupportedDriver(other.to_string())),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DriverKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parameters for opening a connection.
///
/// Every field is optional; whatever is left out falls back to the driver's
/// defaults. For SQLite, `database` is the file path (in-memory if absent)
/// and the network fields are ignored.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub driver: DriverKind,
    pub connect_timeout_secs: Option<u64>,
}

impl ConnectionConfig {
    /// A PostgreSQL config with nothing set.
    pub fn postgres() -> Self {
        ConnectionConfig::default()
    }

    /// A SQLite config for the given file path (or `:memory:`).
    pub fn sqlite(path: impl Into<String>) -> Self {
        ConnectionConfig {
            database: Some(path.into()),
            driver: DriverKind::Sqlite,
            ..ConnectionConfig::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = Some(secs);
        self
    }

    /// Reads the standard libpq variables: PGDATABASE, PGUSER, PGPASSWORD,
    /// PGHOST and PGPORT.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        ConnectionConfig {
            database: var("PGDATABASE"),
            user: var("PGUSER"),
            password: var("PGPASSWORD"),
            host: var("PGHOST"),
            port: var("PGPORT"),
            driver: DriverKind::Postgres,
            connect_timeout_secs: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("driver", &self.driver)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Logging section of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub filter: Option<String>,
}

/// Top-level settings parsed from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Parses settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Loads settings from a TOML file at the given path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sqlconnector::config::Settings;
    ///
    /// let settings = Settings::load("sqlconnector.toml")?;
    /// println!("{:?}", settings.connection);
    /// # Ok::<(), sqlconnector::ConnectorError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConnectorError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// `<config dir>/sqlconnector/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlconnector").join("config.toml"))
    }

    /// Loads settings from `default_path()`.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()
            .ok_or_else(|| ConnectorError::Config("No configuration directory available".to_string()))?;
        Self::load(path)
    }
}
