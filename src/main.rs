mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use fetchq::config::Config;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    fetchq::observability::init_tracing();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_file(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Get(args) => commands::get(config, args).await?,
        Commands::Serve(args) => commands::serve(config, args).await?,
    }

    Ok(())
}
