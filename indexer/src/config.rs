//! Configuration for the indexer
//!
//! This module provides configuration options for the key-value store, the
//! ledger gateway and the block listener. Values are layered: built-in
//! defaults, then an optional file, then `MEDCHAIN__`-prefixed environment
//! variables (for example `MEDCHAIN__REDIS__URL`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{IndexerError, Result};
use crate::ledger::StartPosition;

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "MEDCHAIN";

/// Indexer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Key-value store configuration
    pub redis: RedisConfig,

    /// Ledger gateway configuration
    pub ledger: LedgerConfig,

    /// Block listener configuration
    pub listener: ListenerConfig,

    /// Use the in-process store instead of Redis
    pub memory_store: bool,

    /// Log level
    pub log_level: String,
}

/// Key-value store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL
    pub url: String,

    /// Prefix prepended to every index key
    pub key_prefix: String,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

/// Ledger gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base URL of the ledger REST gateway
    pub gateway_url: String,

    /// Interval between block polls in milliseconds
    pub poll_interval_ms: u64,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Block listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Suspension before resubscribing after the stream closes
    pub reconnect_delay_secs: u64,

    /// Consecutive failed resubscriptions before the listener stops
    pub max_reconnect_attempts: u32,

    /// `latest` or a block height
    pub start: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            ledger: LedgerConfig::default(),
            listener: ListenerConfig::default(),
            memory_store: false,
            log_level: "info".to_string(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: String::new(),
            connect_timeout_secs: 10,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8080".to_string(),
            poll_interval_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 5,
            max_reconnect_attempts: 3,
            start: "latest".to_string(),
        }
    }
}

impl ListenerConfig {
    /// Reconnect suspension as a duration
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Parse the configured start position
    pub fn start_position(&self) -> Result<StartPosition> {
        StartPosition::parse(&self.start)
    }
}

impl LedgerConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl IndexerConfig {
    /// Create a new indexer configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file layered over the defaults
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(Path::new(path)))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(Path::new(path)));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the indexer cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.memory_store && self.redis.url.is_empty() {
            return Err(IndexerError::Config("redis.url must be set unless memory_store is enabled".to_string()));
        }
        if self.ledger.gateway_url.is_empty() {
            return Err(IndexerError::Config("ledger.gateway_url must be set".to_string()));
        }
        if self.ledger.poll_interval_ms == 0 {
            return Err(IndexerError::Config("ledger.poll_interval_ms must be positive".to_string()));
        }
        self.listener.start_position()?;
        Ok(())
    }

    /// Create a configuration for local development
    pub fn for_development() -> Self {
        Self {
            memory_store: true,
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }

    /// Create a configuration for testing
    pub fn for_testing() -> Self {
        Self {
            memory_store: true,
            listener: ListenerConfig {
                // No suspension between reconnects in tests
                reconnect_delay_secs: 0,
                max_reconnect_attempts: 2,
                ..Default::default()
            },
            ledger: LedgerConfig {
                poll_interval_ms: 10,
                ..Default::default()
            },
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }
}
