//! Service configuration.
//!
//! Values are layered, later sources winning:
//! defaults, then an optional YAML file, then `RSCRM_*` environment variables
//! (`__` separates nested keys, so `RSCRM_STORAGE__BACKEND` sets `storage.backend`).
//!
//! ```ignore
//! use rscrm_server::config::ServerConfig;
//!
//! let config = ServerConfig::load("rscrm.yaml")?;
//! let config = ServerConfig::from_env()?;
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use rscrm_domain::Scope;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix: `RSCRM_STORAGE__BACKEND` -> `storage.backend`.
const ENV_PREFIX: &str = "RSCRM";

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Authorization guard settings
    #[serde(default)]
    pub authorization: AuthorizationSettings,
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: "memory" or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database connection URL (required if backend is "postgres")
    pub database_url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Run the engine-owned table migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_url: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
            run_migrations: false,
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Authorization guard settings.
///
/// Environment variables:
/// - `RSCRM_AUTHORIZATION__DEFAULT_SCOPE=team` - scope used when a list request names none
/// - `RSCRM_AUTHORIZATION__RECORD_METRICS=false` - stop guards from recording decision counters
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AuthorizationSettings {
    /// Scope token applied when a list request carries no scope.
    #[serde(default = "default_scope_token")]
    pub default_scope: String,

    /// Record `rscrm_authz_decisions_total` and `rscrm_scope_rejections_total`.
    #[serde(default = "default_true")]
    pub record_metrics: bool,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            default_scope: default_scope_token(),
            record_metrics: true,
        }
    }
}

fn default_scope_token() -> String {
    "user".to_string()
}

fn default_true() -> bool {
    true
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Loads `path` as YAML, with environment overrides on top.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::build(Some(path))
    }

    /// Loads defaults with environment overrides only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::build(None)
    }

    fn build(file: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut builder = Config::builder().add_source(Config::try_from(&ServerConfig::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let loaded: ServerConfig = builder.add_source(env_source()).build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let storage = &self.storage;
        if !STORAGE_BACKENDS.contains(&storage.backend.as_str()) {
            return Err(invalid(format!(
                "storage.backend must be one of: {STORAGE_BACKENDS:?}, got: {}",
                storage.backend
            )));
        }
        let url_missing = storage
            .database_url
            .as_deref()
            .map_or(true, |url| url.trim().is_empty());
        if storage.backend == "postgres" && url_missing {
            return Err(invalid(
                "storage.database_url is required when backend is 'postgres'",
            ));
        }
        if storage.pool_size == 0 {
            return Err(invalid("storage.pool_size must be greater than 0"));
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {LOG_LEVELS:?}, got: {}",
                self.logging.level
            )));
        }

        let scope = &self.authorization.default_scope;
        if Scope::from_token(scope).is_none() {
            return Err(invalid(format!(
                "authorization.default_scope must be one of: my, user, team, brokerage, all, got: {scope}"
            )));
        }

        Ok(())
    }
}

const STORAGE_BACKENDS: [&str; 2] = ["memory", "postgres"];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
