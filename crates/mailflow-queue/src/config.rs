//! Queue configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional file,
//! then `MAILFLOW__*` environment variables (`__` separates nesting levels,
//! e.g. `MAILFLOW__CONNECTIONS__REDIS__URL`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::list::DEFAULT_PREFIX;

/// Table used when a database connection does not configure one
pub const DEFAULT_TABLE: &str = "queue_jobs";

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One named connection; the `driver` field selects the backend kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Process-local list store
    Memory {
        #[serde(default = "default_prefix")]
        prefix: String,
    },
    /// Redis lists and sorted sets
    Redis {
        url: String,
        #[serde(default = "default_prefix")]
        prefix: String,
    },
    /// SQLite table
    Database {
        url: String,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    /// Inline execution inside `push`
    Sync,
}

impl ConnectionConfig {
    pub fn driver(&self) -> &'static str {
        match self {
            Self::Memory { .. } => "memory",
            Self::Redis { .. } => "redis",
            Self::Database { .. } => "database",
            Self::Sync => "sync",
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Settings for a worker process draining a set of lanes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerProfile {
    /// Lanes polled in priority order
    pub lanes: Vec<String>,
    /// Idle sleep when no lane has a ready job
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
    /// Cooldown after a failed job or a backend error
    #[serde(default = "default_error_sleep_secs")]
    pub error_sleep_secs: u64,
    /// Per-job execution limit; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_sleep_secs() -> u64 {
    3
}

fn default_error_sleep_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    60
}

impl WorkerProfile {
    pub fn new(lanes: &[&str], sleep_secs: u64, timeout_secs: u64) -> Self {
        Self {
            lanes: lanes.iter().map(|l| l.to_string()).collect(),
            sleep_secs,
            error_sleep_secs: default_error_sleep_secs(),
            timeout_secs,
        }
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }

    pub fn error_sleep(&self) -> Duration {
        Duration::from_secs(self.error_sleep_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// IANA timezone the cadence is evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Skip a run when the same minute was already claimed
    #[serde(default)]
    pub dedup: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            dedup: false,
        }
    }
}

/// Full queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Connection used by the manager's façade methods
    pub default: String,
    pub connections: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerProfile>,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(
            "redis".to_string(),
            ConnectionConfig::Redis {
                url: "redis://127.0.0.1:6379/0".to_string(),
                prefix: default_prefix(),
            },
        );
        connections.insert(
            "database".to_string(),
            ConnectionConfig::Database {
                url: "sqlite:mailflow.db?mode=rwc".to_string(),
                table: default_table(),
                max_connections: default_max_connections(),
            },
        );
        connections.insert(
            "memory".to_string(),
            ConnectionConfig::Memory {
                prefix: default_prefix(),
            },
        );
        connections.insert("sync".to_string(), ConnectionConfig::Sync);

        let mut workers = BTreeMap::new();
        workers.insert("default".to_string(), WorkerProfile::new(&["default"], 3, 60));
        workers.insert("email".to_string(), WorkerProfile::new(&["email"], 1, 300));
        workers.insert("backup".to_string(), WorkerProfile::new(&["backup"], 10, 1800));
        workers.insert("reports".to_string(), WorkerProfile::new(&["reports"], 10, 1800));

        Self {
            default: "redis".to_string(),
            connections,
            workers,
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl QueueConfig {
    /// Defaults, then `path` if given (otherwise `mailflow.toml` when present),
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&Self::default())?;

        let mut builder = config::Config::builder().add_source(defaults);
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("mailflow").required(false)),
        };

        let config: Self = builder
            .add_source(config::Environment::with_prefix("MAILFLOW").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults (no environment)
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&Self::default())?;
        let config: Self = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.connections.contains_key(&self.default) {
            return Err(ConfigError::Invalid(format!(
                "default connection '{}' is not configured",
                self.default
            )));
        }

        for (name, profile) in &self.workers {
            if profile.lanes.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "worker profile '{name}' has no lanes"
                )));
            }
        }

        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown scheduler timezone '{}'",
                self.scheduler.timezone
            )));
        }

        Ok(())
    }

    pub fn worker(&self, profile: &str) -> Option<&WorkerProfile> {
        self.workers.get(profile)
    }
}
