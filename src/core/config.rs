//! Configuration management for the entity graph engine
//!
//! This module handles all configuration settings with sensible defaults
//! for embedded use.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Metrics and monitoring
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Selectable storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process memory store
    Memory,
    /// On-disk store (not yet supported)
    Disk,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to construct
    pub backend: StorageBackend,

    /// First key handed out by per-type key allocation
    pub initial_key: u64,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics
    pub enable_prometheus: bool,

    /// Enable detailed metrics
    pub enable_detailed: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            initial_key: 1,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable_prometheus: true,
            enable_detailed: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and config file
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file first
        if let Ok(file_config) = Self::from_file("entity-graph.toml") {
            config = file_config;
        }

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        use std::env;

        if let Ok(backend) = env::var("EG_STORAGE_BACKEND") {
            self.storage.backend = match backend.as_str() {
                "memory" => StorageBackend::Memory,
                "disk" => StorageBackend::Disk,
                other => {
                    return Err(Error::config(format!("Invalid storage backend: {}", other)))
                }
            };
        }

        if let Ok(key) = env::var("EG_INITIAL_KEY") {
            self.storage.initial_key = key
                .parse()
                .map_err(|e| Error::config(format!("Invalid initial key: {}", e)))?;
        }

        if let Ok(level) = env::var("EG_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("EG_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.storage.initial_key == 0 {
            return Err(Error::config("Initial key must be at least 1"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            _ => return Err(Error::config("Invalid log format")),
        }

        Ok(())
    }
}
