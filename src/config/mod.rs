//! Configuration management for the seonchak service
//!
//! This module handles loading and validating configuration from environment
//! variables. The drain interval, lock wait timeout, and lock lease timeout
//! are the tuning knobs of the core; everything else configures the ambient
//! backends (Redis, SQLite, HTTP server, logging).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Redis coordination backend configuration
    pub redis: RedisConfig,

    /// Participation store configuration
    pub database: DatabaseConfig,

    /// Drain scheduler configuration
    pub drain: DrainConfig,

    /// Room lock configuration
    pub lock: LockConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Redis backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,
}

/// Participation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Drain scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Fixed period between drain cycles in milliseconds
    pub interval_ms: u64,
}

impl DrainConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Room lock configuration
///
/// `lease_timeout_ms` must exceed the worst-case critical-section duration
/// (lookups + validation + rank issuance + persistence + queue push) with
/// margin, or a second holder can enter while the first is still inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Maximum time a join waits to acquire the room lock, in milliseconds
    pub wait_timeout_ms: u64,

    /// Time after which held ownership auto-expires, in milliseconds
    pub lease_timeout_ms: u64,
}

impl LockConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    pub bind_address: SocketAddr,

    /// Enable permissive CORS (development deployments)
    pub enable_cors: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                pool_size: 10,
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/participations.db"),
            },
            drain: DrainConfig { interval_ms: 3000 },
            lock: LockConfig {
                wait_timeout_ms: 5000,
                lease_timeout_ms: 10000,
            },
            server: ServerConfig {
                bind_address: ([0, 0, 0, 0], 8080).into(),
                enable_cors: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| defaults.redis.url.clone());

        let pool_size = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.redis.pool_size);

        let sqlite_path = std::env::var("SEONCHAK_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database.sqlite_path);

        let interval_ms = std::env::var("SEONCHAK_DRAIN_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.drain.interval_ms);

        let wait_timeout_ms = std::env::var("SEONCHAK_LOCK_WAIT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.lock.wait_timeout_ms);

        let lease_timeout_ms = std::env::var("SEONCHAK_LOCK_LEASE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.lock.lease_timeout_ms);

        let bind_address = std::env::var("SEONCHAK_BIND_ADDRESS")
            .ok()
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or(defaults.server.bind_address);

        let enable_cors = std::env::var("SEONCHAK_ENABLE_CORS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(defaults.server.enable_cors);

        let level =
            std::env::var("SEONCHAK_LOG_LEVEL").unwrap_or_else(|_| defaults.logging.level.clone());

        let format = std::env::var("SEONCHAK_LOG_FORMAT")
            .unwrap_or_else(|_| defaults.logging.format.clone());

        let config = Self {
            redis: RedisConfig {
                url: redis_url,
                pool_size,
            },
            database: DatabaseConfig { sqlite_path },
            drain: DrainConfig { interval_ms },
            lock: LockConfig {
                wait_timeout_ms,
                lease_timeout_ms,
            },
            server: ServerConfig {
                bind_address,
                enable_cors,
            },
            logging: LoggingConfig { level, format },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.drain.interval_ms == 0 {
            anyhow::bail!("drain interval must be positive");
        }
        if self.lock.lease_timeout_ms == 0 {
            anyhow::bail!("lock lease timeout must be positive");
        }
        if self.lock.lease_timeout_ms < self.lock.wait_timeout_ms {
            tracing::warn!(
                lease_ms = self.lock.lease_timeout_ms,
                wait_ms = self.lock.wait_timeout_ms,
                "lock lease timeout is shorter than the wait timeout"
            );
        }
        Ok(())
    }
}
