mod commands;
mod config;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[clap(version, about = "Browser-to-SSH gateway")]
pub struct Cli {
    /// Configuration file path
    #[clap(long, short, default_value = "gangway.yaml", env = "GANGWAY_CONFIG_FILE")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[clap(long, short, action = ArgAction::Count)]
    debug: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Run,
    /// Validate the config file and exit
    Check,
    /// Probe a running instance's health endpoint
    Healthcheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli)?;

    match &cli.command {
        Commands::Run => commands::run::command(&cli).await,
        Commands::Check => commands::check::command(&cli).await,
        Commands::Healthcheck => commands::healthcheck::command(&cli).await,
    }
}
