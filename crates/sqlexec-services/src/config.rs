//! Service configuration
//!
//! Loaded from TOML, either an explicit file or `<config dir>/sqlexec/config.toml`
//! when present, then overridden from the environment.

use serde::{Deserialize, Serialize};
use sqlexec_executor::{BackoffStrategy, DEFAULT_DIALECT};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ServiceError, ServiceResult};

/// Environment variable overriding `database.path`
pub const DATABASE_PATH_ENV: &str = "SQLEXEC_DATABASE_PATH";
/// Environment variable overriding `logging.filter`
pub const LOG_FILTER_ENV: &str = "SQLEXEC_LOG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub database: DatabaseConfig,
    pub executor: ExecutorConfig,
    pub validation: ValidationConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file, or `:memory:`
    pub path: Option<String>,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Timeout for transactions that do not set one
    pub default_timeout_secs: u64,
    /// Limit on concurrently running transactions per batch
    pub max_concurrency: Option<usize>,
    /// Backoff between open retries; no delay when unset
    pub retry_backoff_initial_ms: Option<u64>,
    pub retry_backoff_max_ms: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 300,
            max_concurrency: None,
            retry_backoff_initial_ms: None,
            retry_backoff_max_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// `sqlparser` dialect name
    pub dialect: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            dialect: DEFAULT_DIALECT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    pub filter: String,
    /// Directory for daily-rotated JSON logs; console only when unset
    pub json_log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json_log_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `path`, or from the default location if it exists.
    ///
    /// Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> ServiceResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ServiceResult<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ServiceResult<Self> {
        toml::from_str(content)
            .map_err(|e| ServiceError::Configuration(format!("invalid configuration: {}", e)))
    }

    /// `<config dir>/sqlexec/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlexec").join("config.toml"))
    }

    /// Apply overrides looked up by environment variable name
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(DATABASE_PATH_ENV).filter(|p| !p.is_empty()) {
            self.database.path = Some(path);
        }
        if let Some(filter) = lookup(LOG_FILTER_ENV).filter(|f| !f.is_empty()) {
            self.logging.filter = filter;
        }
    }

    /// Configured database path; required to run
    pub fn database_path(&self) -> ServiceResult<&str> {
        self.database.path.as_deref().ok_or_else(|| {
            ServiceError::Configuration(format!(
                "database.path is required (or set {})",
                DATABASE_PATH_ENV
            ))
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.default_timeout_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.lifecycle.shutdown_grace_secs)
    }

    /// Backoff between open retries, if configured
    pub fn retry_backoff(&self) -> Option<BackoffStrategy> {
        self.executor.retry_backoff_initial_ms.map(|initial_ms| {
            BackoffStrategy::new(
                initial_ms,
                self.executor.retry_backoff_max_ms.unwrap_or(initial_ms),
            )
        })
    }
}
