use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal::unix::SignalKind;
use tracing::*;
use turnstile_common::FileUserStore;
use turnstile_core::Services;
use turnstile_pool::WorkerPool;

use crate::config::load_config;
use crate::router::Router;
use crate::Cli;

/// Assembles the user store, caches, worker pool and router, starts
/// them, waits for a shutdown signal, then tears down in reverse order:
/// build `Services`, start the router and the worker pool, background
/// the periodic eviction sweep, then `tokio::select!` on ctrl-c / SIGTERM.
pub async fn command(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let data_dir = PathBuf::from(&config.data_dir);
    let eviction_sweep_secs = config.eviction_sweep_secs;
    let connection_timeout_secs = config.connection_timeout_secs as i64;

    let user_store = Arc::new(FileUserStore::open(&data_dir).await?);
    let services = Services::new(config, user_store);

    let pool = Arc::new(WorkerPool::new(&services));
    pool.start_all().await?;
    info!(buckets = pool.bucket_count(), "worker pool started");

    let router = Arc::new(Router::new(services.clone(), pool.clone()));
    router.start().await?;

    let sweep_services = services.clone();
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(eviction_sweep_secs));
        loop {
            interval.tick().await;
            let evicted = sweep_services.sessions.evict_inactive(connection_timeout_secs).await;
            if evicted > 0 {
                debug!(evicted, "evicted inactive sessions");
            }
            sweep_services.abuse.clear_expired().await;
        }
    });

    info!("turnstile is now running");

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt");
        }
        _ = sigterm.recv() => {
            info!("received termination signal");
        }
    }

    info!("shutting down");
    sweep_handle.abort();
    router.shutdown().await;
    pool.shutdown_all().await;
    info!("exiting");

    Ok(())
}
