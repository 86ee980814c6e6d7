use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use turnstile_common::{FileUserStore, RegisterOutcome, UserStore};

use crate::config::load_config;
use crate::Cli;

/// Registers a user directly against the file store, bypassing the wire
/// protocol and its rate limiting — an operator convenience.
pub async fn command(cli: &Cli, username: &str, password: &str) -> Result<()> {
    let config = load_config(&cli.config)?;
    let store = FileUserStore::open(&PathBuf::from(&config.data_dir)).await?;
    let store: Arc<dyn UserStore> = Arc::new(store);

    match store.register(username, password).await? {
        RegisterOutcome::Ok => {
            println!("User '{username}' created");
            Ok(())
        }
        RegisterOutcome::AlreadyExists => bail!("User '{username}' already exists"),
    }
}
