//! Server configuration
//!
//! Layered from an optional YAML file (`BANNER_CONFIG`, default
//! `config/local.yaml`) and `BANNER__*` environment variables, e.g.
//! `BANNER__HTTP_SERVER__ADDRESS=0.0.0.0:8080`.

use anyhow::Context;
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::services::ServiceOptions;

pub const DEFAULT_CONFIG_PATH: &str = "config/local.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    Local,
    #[default]
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub env: Env,
    pub http_server: HttpServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    pub address: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/banner.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
    pub invalidate_on_write: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            invalidate_on_write: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub operation_timeout_ms: u64,
    pub auto_register_refs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 4000,
            auto_register_refs: true,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var("BANNER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let builder = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("BANNER")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
            .with_context(|| format!("Failed to load configuration (file: {})", path))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            operation_timeout: Duration::from_millis(self.storage.operation_timeout_ms),
            invalidate_on_write: self.cache.invalidate_on_write,
            auto_register_refs: self.storage.auto_register_refs,
        }
    }
}
