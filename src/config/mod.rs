//! # Configuration System
//!
//! Every setting has a built-in default. A TOML file and `CALCFLOW__*` environment variables
//! are layered on top by [`ConfigManager`].
//!
//! ```toml
//! [workers]
//! initial_size = 4
//! delay_unit_ms = 1000
//!
//! [delays]
//! default_seconds = 10
//!
//! [database]
//! url = "sqlite://calcflow.db?mode=rwc"
//! max_connections = 5
//!
//! [events]
//! channel_capacity = 1024
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::delays::{DEFAULT_DELAY_UNIT_MS, DEFAULT_OPERATION_DELAY};
use crate::constants::pool::{DEFAULT_WORKER_COUNT, MIN_WORKERS};
use crate::execution::WorkerPoolConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcflowConfig {
    pub workers: WorkersConfig,
    pub delays: DelaysConfig,
    pub database: DatabaseConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub initial_size: usize,
    /// Milliseconds per delay unit; the stored delays count these units
    pub delay_unit_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_WORKER_COUNT,
            delay_unit_ms: DEFAULT_DELAY_UNIT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelaysConfig {
    /// Seeded for operators with no stored delay
    pub default_seconds: u64,
}

impl Default for DelaysConfig {
    fn default() -> Self {
        Self {
            default_seconds: DEFAULT_OPERATION_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://calcflow.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl CalcflowConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers.initial_size < MIN_WORKERS {
            return Err(ConfigurationError::invalid_value(
                "workers.initial_size",
                self.workers.initial_size,
                format!("the pool needs at least {MIN_WORKERS} workers"),
            ));
        }
        if self.workers.delay_unit_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "workers.delay_unit_ms",
                0,
                "delay unit must be greater than 0",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                0,
                "pool size must be greater than 0",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                0,
                "channel capacity must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn worker_pool(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            initial_size: self.workers.initial_size,
            delay_unit_ms: self.workers.delay_unit_ms,
        }
    }
}
