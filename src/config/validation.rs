use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("downloads.workers must be at least 1")]
    NoWorkers,

    #[error("downloads.chunk_size must be positive")]
    ZeroChunkSize,

    #[error("downloads.progress_buffer must be at least 1")]
    ZeroProgressBuffer,

    #[error("downloads.output_dir must not be empty")]
    EmptyOutputDir,

    #[error("http.user_agent must not be empty")]
    EmptyUserAgent,

    #[error("Timeout must be positive: {field} = 0")]
    ZeroTimeout { field: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_downloads(config)?;
    validate_http(config)?;
    Ok(())
}

fn validate_downloads(config: &Config) -> Result<(), ValidationError> {
    let downloads = &config.downloads;

    if downloads.workers == 0 {
        return Err(ValidationError::NoWorkers);
    }

    if downloads.chunk_size.as_u64() == 0 {
        return Err(ValidationError::ZeroChunkSize);
    }

    if downloads.progress_buffer == 0 {
        return Err(ValidationError::ZeroProgressBuffer);
    }

    if downloads.output_dir.as_os_str().is_empty() {
        return Err(ValidationError::EmptyOutputDir);
    }

    Ok(())
}

fn validate_http(config: &Config) -> Result<(), ValidationError> {
    let http = &config.http;

    if http.user_agent.trim().is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }

    for (field, value) in [
        ("connect_timeout_secs", http.connect_timeout_secs),
        ("read_timeout_secs", http.read_timeout_secs),
        ("write_timeout_secs", http.write_timeout_secs),
    ] {
        if value == 0 {
            return Err(ValidationError::ZeroTimeout { field });
        }
    }

    Ok(())
}
