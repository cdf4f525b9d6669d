//! Configuration management for the material ledger
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with MLEDGER_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// FIFO allocation engine limits
    pub fifo: FifoConfig,

    /// Health monitor thresholds
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; the in-memory ledger is used when absent
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FifoConfig {
    /// Most lots a single allocation run may draw from
    pub max_lots_per_run: usize,

    /// Attempts before a contended allocation gives up
    pub max_conflict_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Dead-row percentage above which a table needs compaction
    pub dead_row_threshold_pct: u32,

    /// Ledger updates per stock position in 24h that indicate a runaway loop
    pub runaway_update_threshold: i64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("MLEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("fifo.max_lots_per_run", 500)?
            .set_default("fifo.max_conflict_retries", 5)?
            .set_default("monitoring.dead_row_threshold_pct", 10)?
            .set_default("monitoring.runaway_update_threshold", 1000)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (MLEDGER_ prefix)
            .add_source(
                Environment::with_prefix("MLEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            max_lots_per_run: shared::fifo::DEFAULT_MAX_LOTS_PER_RUN,
            max_conflict_retries: 5,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            dead_row_threshold_pct: 10,
            runaway_update_threshold: 1000,
        }
    }
}

impl Default for Config {
    /// Development settings with the in-memory ledger
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                min_connections: 2,
            },
            fifo: FifoConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}
