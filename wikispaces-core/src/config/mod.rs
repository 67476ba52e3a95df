//! Configuration management for the space registry
//!
//! Configuration comes from defaults, a TOML file or `WIKISPACES_*`
//! environment variables, and is validated before use. The `spaces` section
//! is handed to the repository as a snapshot at construction.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Namespace names the platform reserves for itself
pub const DEFAULT_CORE_NAMESPACES: &[&str] = &[
    "Main", "Talk", "User", "Project", "File", "Template", "Help", "Category", "Special", "Media",
];

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing store
    pub store: StoreConfig,

    /// Space registry behavior
    pub spaces: SpacesConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store engine name (`sqlite`, `postgres`, `mysql`)
    pub backend: String,

    /// Primary database file
    pub database_path: PathBuf,

    /// Read replica; reads go to the primary when unset
    pub replica_path: Option<PathBuf>,

    /// Maximum pooled connections per pool
    pub pool_size: u32,

    /// How long to wait for a pooled connection or a busy database
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
}

/// Space registry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacesConfig {
    /// Whether spaces may be archived at all
    pub archiving_enabled: bool,

    /// Mirror administrator changes into the group-membership store
    pub auto_group_sync: bool,

    /// Core namespace names a space key must not shadow
    pub core_namespaces: BTreeSet<String>,

    /// Extension-provided namespaces, name to id
    pub extension_namespaces: BTreeMap<String, i64>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            database_path: PathBuf::from("./data/wikispaces.db"),
            replica_path: None,
            pool_size: 8,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for SpacesConfig {
    fn default() -> Self {
        Self {
            archiving_enabled: true,
            auto_group_sync: false,
            core_namespaces: DEFAULT_CORE_NAMESPACES.iter().map(|s| s.to_string()).collect(),
            extension_namespaces: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: WIKISPACES_<SECTION>_<KEY>
    /// Example: WIKISPACES_STORE_DATABASE_PATH=/var/lib/wiki/spaces.db
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Store config
        if let Some(backend) = lookup("WIKISPACES_STORE_BACKEND") {
            config.store.backend = backend;
        }
        if let Some(path) = lookup("WIKISPACES_STORE_DATABASE_PATH") {
            config.store.database_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("WIKISPACES_STORE_REPLICA_PATH") {
            config.store.replica_path = Some(PathBuf::from(path));
        }
        if let Some(size) = lookup("WIKISPACES_STORE_POOL_SIZE") {
            config.store.pool_size = parse_value(&size, "pool size")?;
        }
        if let Some(timeout) = lookup("WIKISPACES_STORE_CONNECTION_TIMEOUT") {
            config.store.connection_timeout = humantime_serde::re::humantime::parse_duration(&timeout)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid connection timeout: {}", e)))?;
        }

        // Spaces config
        if let Some(flag) = lookup("WIKISPACES_SPACES_ARCHIVING_ENABLED") {
            config.spaces.archiving_enabled = parse_value(&flag, "archiving flag")?;
        }
        if let Some(flag) = lookup("WIKISPACES_SPACES_AUTO_GROUP_SYNC") {
            config.spaces.auto_group_sync = parse_value(&flag, "group sync flag")?;
        }
        if let Some(names) = lookup("WIKISPACES_SPACES_CORE_NAMESPACES") {
            config.spaces.core_namespaces = names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }

        // Logging config
        if let Some(level) = lookup("WIKISPACES_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = lookup("WIKISPACES_LOG_JSON") {
            config.logging.json_format = parse_value(&json, "JSON flag")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate store config
        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        if self.store.database_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed("database_path must not be empty".to_string()));
        }

        // Validate spaces config
        if let Some(name) = self
            .spaces
            .core_namespaces
            .iter()
            .find(|name| name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid core namespace name: '{}'",
                name
            )));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        let path = path.as_ref();
        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

fn parse_value<T>(raw: &str, what: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e)))
}
