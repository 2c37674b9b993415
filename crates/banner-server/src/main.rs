//! Banner Server
//!
//! Serves banners addressed by `(tag, feature)` over HTTP, backed by an
//! embedded SQLite store with a cache-aside read path.

mod config;
mod handlers;
mod logging;
mod services;
mod storage;

use anyhow::{Context, Result};
use banner_core::BannerCache;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{AppConfig, CacheBackend};
use services::BannerService;
use storage::{Database, MemoryCache, RedisCache};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BannerService>,
}

#[tokio::main]
async fn main() {
    install_panic_hook();

    // Logging depends on the configured environment, so load config first
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[FATAL] {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_tracing(config.env) {
        eprintln!("[FATAL] {:#}", e);
        std::process::exit(1);
    }

    info!("Starting Banner Server v{}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}, env: {:?}", std::process::id(), config.env);

    if let Err(e) = run_server(config).await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

/// Route panics through tracing, then fall back to the default report.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = panic_message(info.payload());
        match info.location() {
            Some(at) => error!(file = at.file(), line = at.line(), "panic: {}", message),
            None => error!("panic: {}", message),
        }
        default_hook(info);
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

async fn run_server(config: AppConfig) -> Result<()> {
    info!(
        "Config loaded: bind={}, db={}, cache={:?}",
        config.http_server.address, config.database.path, config.cache.backend
    );

    let db = Arc::new(
        Database::new(&config.database.path, config.database.max_connections)
            .await
            .context("Failed to initialize database")?,
    );
    info!("SQLite database initialized at: {}", config.database.path);

    let cache = init_cache(&config).await;

    let service = BannerService::with_options(db, cache, config.service_options());
    let state = AppState {
        service: Arc::new(service),
    };

    let app = handlers::router(state);

    let addr: SocketAddr = config
        .http_server
        .address
        .parse()
        .context("Failed to parse bind address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Redis when configured and reachable, otherwise the in-process cache.
async fn init_cache(config: &AppConfig) -> Arc<dyn BannerCache> {
    match config.cache.backend {
        CacheBackend::Memory => {
            info!("Using in-memory cache");
            Arc::new(MemoryCache::new())
        }
        CacheBackend::Redis => match RedisCache::connect(&config.cache.redis_url).await {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                warn!(
                    "Redis unavailable at {} ({:#}), falling back to in-memory cache",
                    config.cache.redis_url, e
                );
                Arc::new(MemoryCache::new())
            }
        },
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            // Without a signal handler, run until killed
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
