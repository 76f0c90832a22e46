use super::models::Config;
use config::{ConfigError, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "FETCHQ_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/fetchq.toml";
const ENV_PREFIX: &str = "FETCHQ";
const ENV_SEPARATOR: &str = "__";
const TOKEN_VAR_PREFIX: &str = "FETCHQ_TOKEN_";

/// Load configuration with priority (lowest to highest):
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables
pub fn load() -> Result<Config, ConfigError> {
    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_with_secrets(config_path)
}

/// Same layering as [`load`] for an explicit file, secrets included
pub fn load_with_secrets(config_path: PathBuf) -> Result<Config, ConfigError> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;
    config.auth.tokens = tokens_from_vars(env::vars());

    Ok(config)
}

/// Collect `FETCHQ_TOKEN_<ORG>=<token>` pairs. Org names are lowercased.
pub fn tokens_from_vars<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            let org = key.strip_prefix(TOKEN_VAR_PREFIX)?;
            if org.is_empty() || value.is_empty() {
                return None;
            }
            Some((org.to_lowercase(), value))
        })
        .collect()
}

/// Load configuration from a specific path plus environment overrides
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // FETCHQ__DOWNLOADS__WORKERS -> downloads.workers
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
