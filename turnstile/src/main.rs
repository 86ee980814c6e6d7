use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod logging;
mod router;

/// Front-door authentication router: register and authenticate clients,
/// then hand them off to a dedicated worker-socket port.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[clap(short, long, default_value = "config.yaml", env = "TURNSTILE_CONFIG")]
    config: PathBuf,

    /// Increase log verbosity (-d, -dd).
    #[clap(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the router and worker-socket pool.
    Run,
    /// Validate the configuration file and exit.
    CheckConfig,
    /// Hash a password for manual insertion or inspection.
    HashPassword,
    /// Register a user directly against the file store.
    CreateUser {
        username: String,
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug)?;

    match &cli.command {
        Commands::Run => commands::run::command(&cli).await,
        Commands::CheckConfig => commands::check::command(&cli),
        Commands::HashPassword => commands::hash_password::command(),
        Commands::CreateUser { username, password } => {
            commands::create_user::command(&cli, username, password).await
        }
    }
}
