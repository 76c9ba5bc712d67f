//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod storage;

pub use storage::{PostgresConfig, SqliteConfig, StorageConfig, StorageType};

use std::time::Duration;

use serde::Deserialize;

use crate::retention::Period;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "periscope.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PERISCOPE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PERISCOPE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PERISCOPE_LOG";

/// Number of buckets when a retention request does not say.
pub const DEFAULT_TOTAL_INTERVALS: usize = 11;
/// Upper limit on `total_intervals` a request may ask for.
pub const DEFAULT_MAX_INTERVALS: usize = 1000;
/// Store call timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Retention request defaults.
    pub retention: RetentionDefaults,
    /// Store call limits.
    pub query: QueryConfig,
}

/// Values used when a retention request leaves them out.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionDefaults {
    pub total_intervals: usize,
    pub period: Period,
    /// Requests above this many intervals are rejected.
    pub max_intervals: usize,
}

impl Default for RetentionDefaults {
    fn default() -> Self {
        Self {
            total_intervals: DEFAULT_TOTAL_INTERVALS,
            period: Period::Day,
            max_intervals: DEFAULT_MAX_INTERVALS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Per store call; 0 disables the timeout.
    pub timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `periscope.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing: in-memory SQLite.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                sqlite: SqliteConfig {
                    path: ":memory:".to_string(),
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
