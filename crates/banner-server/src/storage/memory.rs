//! In-process banner cache using DashMap (stands in for Redis)

use async_trait::async_trait;
use banner_core::{BannerCache, BannerError, Result};
use banner_types::cache_key;
use dashmap::DashMap;
use std::sync::Arc;

/// Content cache keyed by `tag:feature`. Entries never expire.
#[derive(Clone, Default)]
pub struct MemoryCache {
    data: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, key: String, value: Vec<u8>) {
        self.data.insert(key, value);
    }

    pub fn delete(&self, key: &str) {
        self.data.remove(key);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl BannerCache for MemoryCache {
    async fn set_banner(&self, tag_id: i64, feature_id: i64, content: &[u8]) -> Result<()> {
        self.set(cache_key(tag_id, feature_id), content.to_vec());
        Ok(())
    }

    async fn get_banner(&self, key: &str) -> Result<Vec<u8>> {
        self.get(key)
            .ok_or_else(|| BannerError::NotFound(format!("cache.memory.get_banner: {}", key)))
    }

    async fn invalidate(&self, tag_id: i64, feature_id: i64) -> Result<()> {
        self.delete(&cache_key(tag_id, feature_id));
        Ok(())
    }
}
