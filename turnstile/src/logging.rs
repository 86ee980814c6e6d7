use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::filter::dynamic_filter_fn;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initializes structured console logging: an `EnvFilter` wrapped in a
/// `dynamic_filter_fn` so it can be shared across layers, a local-time
/// formatter, registered via `tracing_subscriber::registry()`.
pub fn init_logging(debug: u8) -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        let default = match debug {
            0 => "turnstile=info",
            1 => "turnstile=debug",
            _ => "debug",
        };
        std::env::set_var("RUST_LOG", default);
    }

    let env_filter = Arc::new(EnvFilter::from_default_env());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_filter(dynamic_filter_fn(move |metadata, ctx| {
            env_filter.enabled(metadata, ctx.clone())
        }));

    tracing_subscriber::registry().with(fmt_layer).init();
    Ok(())
}
