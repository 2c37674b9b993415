//! Tracing setup per deployment environment

use crate::config::Env;
use tracing_subscriber::EnvFilter;

/// Local runs get readable text at debug, dev gets JSON at debug and prod
/// gets JSON at info. `RUST_LOG` takes precedence when set.
pub fn init_tracing(env: Env) -> anyhow::Result<()> {
    let default_level = match env {
        Env::Local | Env::Dev => "debug",
        Env::Prod => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match env {
        Env::Local => builder.try_init(),
        Env::Dev | Env::Prod => builder.json().try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
