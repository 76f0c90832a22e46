//! Configuration management for fetchq
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use fetchq::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Saving into: {}", config.downloads.output_dir.display());
//! ```
//!
//! # Environment Variables
//!
//! Settings can be overridden with `FETCHQ__<section>__<key>`:
//! - `FETCHQ__DOWNLOADS__WORKERS=8`
//! - `FETCHQ__DOWNLOADS__CHUNK_SIZE=64KB`
//! - `FETCHQ__HTTP__READ_TIMEOUT_SECS=120`
//!
//! Organization tokens are secrets and only come from the environment:
//! `FETCHQ_TOKEN_<ORG>=<token>`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/fetchq.toml`.
//! This can be overridden using the `FETCHQ_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{AuthConfig, Config, DownloadsConfig, HttpConfig, ServerConfig};
pub use sources::tokens_from_vars;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load an explicit config file plus environment overrides and tokens
    pub fn load_file(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_with_secrets(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, without secrets
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
