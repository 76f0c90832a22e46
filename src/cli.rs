use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fetchq")]
#[command(about = "Download URLs through a bounded worker queue", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (overrides FETCHQ_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the given URLs and exit when all are done
    Get(GetArgs),
    /// Run the queue behind the HTTP operator API
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// URLs to download
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Number of concurrent downloads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Directory to save files into
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Organization whose bearer token authenticates every request
    #[arg(long)]
    pub org: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Number of concurrent downloads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Directory to save files into
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}
