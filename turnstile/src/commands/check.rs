use anyhow::Result;
use tracing::*;

use crate::config::load_config;
use crate::Cli;

/// Loads and validates configuration without starting anything.
pub fn command(cli: &Cli) -> Result<()> {
    load_config(&cli.config)?;
    info!("No problems found");
    Ok(())
}
