use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use tracing::*;
use turnstile_common::TurnstileConfig;

/// Loads `config.yaml` (or whatever path is given) layered under
/// `TURNSTILE_*` environment overrides, then validates it.
pub fn load_config(path: &Path) -> Result<TurnstileConfig> {
    let config: TurnstileConfig = Config::builder()
        .add_source(File::from(path.to_path_buf()).required(false))
        .add_source(Environment::with_prefix("TURNSTILE"))
        .build()
        .context("failed to build configuration")?
        .try_deserialize()
        .context("failed to parse configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    info!(
        main_port = config.main_port,
        user_port_start = config.user_port_start,
        bucket_count = config.bucket_count(),
        "loaded configuration",
    );
    Ok(config)
}
