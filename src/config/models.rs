use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Queue and worker pool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadsConfig {
    /// Number of worker loops, i.e. the hard cap on concurrent downloads
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Largest slice written to disk per progress update
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,
    /// Progress events buffered per subscriber before it starts lagging
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            output_dir: default_output_dir(),
            chunk_size: default_chunk_size(),
            progress_buffer: default_progress_buffer(),
        }
    }
}

fn default_workers() -> usize {
    3
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_chunk_size() -> ByteSize {
    ByteSize(8 * 1024)
}

fn default_progress_buffer() -> usize {
    1024
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Applied to each disk write of a downloaded chunk
    #[serde(default = "default_io_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_io_timeout_secs(),
            write_timeout_secs: default_io_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    "DownloadManager/1.0".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_io_timeout_secs() -> u64 {
    60
}

/// Operator API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Bearer tokens per organization
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Loaded from `FETCHQ_TOKEN_<ORG>` only, never from the config file
    #[serde(skip)]
    pub tokens: HashMap<String, String>,
}
