//! Redis-backed banner cache

use async_trait::async_trait;
use banner_core::{BannerCache, BannerError, Result};
use banner_types::cache_key;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Shared Redis connection; the manager reconnects on its own after failures.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis at {}", url);
        Ok(Self { conn })
    }
}

#[async_trait]
impl BannerCache for RedisCache {
    async fn set_banner(&self, tag_id: i64, feature_id: i64, content: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(cache_key(tag_id, feature_id), content)
            .await
            .map_err(|e| BannerError::InvalidData(format!("cache.redis.set_banner: {}", e)))
    }

    async fn get_banner(&self, key: &str) -> Result<Vec<u8>> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(Some(content)) => Ok(content),
            Ok(None) => Err(BannerError::NotFound(format!(
                "cache.redis.get_banner: {}",
                key
            ))),
            Err(e) => {
                // Reads fall through to the store when Redis is unavailable
                tracing::warn!(key, error = %e, "redis read failed");
                Err(BannerError::NotFound(format!(
                    "cache.redis.get_banner: {}",
                    e
                )))
            }
        }
    }

    async fn invalidate(&self, tag_id: i64, feature_id: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(cache_key(tag_id, feature_id))
            .await
            .map_err(|e| BannerError::Internal(format!("cache.redis.invalidate: {}", e)))
    }
}
