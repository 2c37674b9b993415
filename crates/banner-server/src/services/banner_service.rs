//! Banner service: coordinates the relational store with the cache

use banner_core::{validate, BannerCache, BannerError, BannerStore, Result};
use banner_types::{cache_key, Banner, BannerFilter, BannerPatch, NewBanner, Slot};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Budget for a whole operation, cache calls included; expiry rolls the
    /// open transaction back
    pub operation_timeout: Duration,
    /// Evict affected slots from the cache after update and delete.
    ///
    /// A read that loaded content before a write began does not refill the
    /// cache afterwards. A write that starts between that check and the
    /// refill itself can still leave the old content cached until the slot
    /// is written again.
    pub invalidate_on_write: bool,
    /// Insert unknown tag and feature ids before writes
    pub auto_register_refs: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            invalidate_on_write: false,
            auto_register_refs: false,
        }
    }
}

/// Point in time by which one operation must finish.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Run a store call; running out of time is an internal error.
    async fn run<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => {
                if let Err(e) = &result {
                    debug!(op, code = e.code(), "operation failed: {}", e);
                }
                result
            }
            Err(_) => {
                warn!(op, "operation deadline exceeded");
                Err(BannerError::Internal(format!(
                    "{}: deadline of {:?} exceeded",
                    op, self.budget
                )))
            }
        }
    }

    /// Run a best-effort cache call; `None` when time ran out first.
    async fn try_run<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::time::timeout_at(self.at, fut).await.ok()
    }

    /// Earlier deadline leaving the store at least half of what remains.
    fn probe(&self) -> Self {
        let remaining = self.at.saturating_duration_since(Instant::now());
        Self {
            at: Instant::now() + remaining / 2,
            budget: self.budget,
        }
    }
}

#[derive(Clone)]
pub struct BannerService {
    store: Arc<dyn BannerStore>,
    cache: Arc<dyn BannerCache>,
    options: ServiceOptions,
    /// Bumped when an update or delete starts
    writes: Arc<AtomicU64>,
}

impl BannerService {
    pub fn new(store: Arc<dyn BannerStore>, cache: Arc<dyn BannerCache>) -> Self {
        Self::with_options(store, cache, ServiceOptions::default())
    }

    pub fn with_options(
        store: Arc<dyn BannerStore>,
        cache: Arc<dyn BannerCache>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            store,
            cache,
            options,
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Copy of this service bounded by a caller-supplied deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut service = self.clone();
        service.options.operation_timeout = timeout;
        service
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.options.operation_timeout)
    }

    pub async fn create_banner(&self, banner: &NewBanner) -> Result<i64> {
        let deadline = self.deadline();
        let banner = validate::new_banner(banner)?;

        info!(
            "Creating banner: feature={}, tags={:?}",
            banner.feature_id, banner.tag_ids
        );

        let banner_id = deadline
            .run("service.create_banner", async {
                if self.options.auto_register_refs {
                    self.store
                        .register_references(Some(banner.feature_id), &banner.tag_ids)
                        .await?;
                }
                self.store.create_banner(&banner).await
            })
            .await?;

        // Populate the read path; a cache failure never fails the create
        let content = match serde_json::to_vec(&banner.content) {
            Ok(content) => content,
            Err(e) => {
                warn!(banner_id, error = %e, "cache populate skipped");
                return Ok(banner_id);
            }
        };
        for tag_id in &banner.tag_ids {
            let stored = deadline
                .try_run(self.cache.set_banner(*tag_id, banner.feature_id, &content))
                .await;
            match stored {
                Some(Ok(())) => {}
                Some(Err(e)) => warn!(banner_id, tag_id, error = %e, "cache populate failed"),
                None => {
                    warn!(banner_id, tag_id, "cache populate timed out");
                    break;
                }
            }
        }

        Ok(banner_id)
    }

    /// Content for a slot, served from the cache unless `use_last_revision`.
    pub async fn get_banner(
        &self,
        tag_id: i64,
        feature_id: i64,
        use_last_revision: bool,
    ) -> Result<Value> {
        let deadline = self.deadline();
        let key = cache_key(tag_id, feature_id);
        let writes_seen = self.writes.load(Ordering::SeqCst);

        if !use_last_revision {
            if let Some(content) = self.probe_cache(&deadline.probe(), &key).await {
                return Ok(content);
            }
        }

        let content = deadline
            .run("service.get_banner", self.store.get_banner(tag_id, feature_id))
            .await?;

        if self.options.invalidate_on_write && self.writes.load(Ordering::SeqCst) != writes_seen {
            debug!(key = %key, "cache refresh skipped, write in progress");
            return Ok(content);
        }

        match serde_json::to_vec(&content) {
            Ok(bytes) => {
                let stored = deadline
                    .try_run(self.cache.set_banner(tag_id, feature_id, &bytes))
                    .await;
                match stored {
                    Some(Ok(())) => {}
                    Some(Err(e)) => warn!(key = %key, error = %e, "cache refresh failed"),
                    None => warn!(key = %key, "cache refresh timed out"),
                }
            }
            Err(e) => warn!(key = %key, error = %e, "cache refresh skipped"),
        }

        Ok(content)
    }

    pub async fn list_banners(&self, filter: &BannerFilter) -> Result<Vec<Banner>> {
        debug!("Listing banners: {:?}", filter);

        self.deadline()
            .run("service.list_banners", self.store.list_banners(filter))
            .await
    }

    pub async fn get_banner_by_id(&self, banner_id: i64) -> Result<Banner> {
        self.deadline()
            .run("service.get_banner_by_id", self.store.get_banner_by_id(banner_id))
            .await
    }

    pub async fn update_banner(&self, banner_id: i64, patch: &BannerPatch) -> Result<()> {
        let deadline = self.deadline();
        let patch = validate::patch(patch)?;

        info!("Updating banner {}: {:?}", banner_id, patch);

        self.writes.fetch_add(1, Ordering::SeqCst);
        let slots = deadline
            .run("service.update_banner", async {
                if self.options.auto_register_refs
                    && (patch.feature_id.is_some() || patch.tag_ids.is_some())
                {
                    let tag_ids = patch.tag_ids.as_deref().unwrap_or(&[]);
                    self.store
                        .register_references(patch.feature_id, tag_ids)
                        .await?;
                }
                self.store.update_banner(banner_id, &patch).await
            })
            .await?;

        self.evict(&deadline, &slots).await;

        Ok(())
    }

    pub async fn delete_banner(&self, banner_id: i64) -> Result<()> {
        let deadline = self.deadline();

        info!("Deleting banner {}", banner_id);

        self.writes.fetch_add(1, Ordering::SeqCst);
        let slots = deadline
            .run("service.delete_banner", self.store.delete_banner(banner_id))
            .await?;

        self.evict(&deadline, &slots).await;

        Ok(())
    }

    /// Cache lookup where every failure, including a slow backend, is a miss.
    async fn probe_cache(&self, deadline: &Deadline, key: &str) -> Option<Value> {
        match deadline.try_run(self.cache.get_banner(key)).await {
            Some(Ok(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(content) => Some(content),
                Err(e) => {
                    warn!(key, error = %e, "undecodable cache entry");
                    None
                }
            },
            Some(Err(e)) => {
                debug!(key, error = %e, "cache miss");
                None
            }
            None => {
                warn!(key, "cache lookup timed out");
                None
            }
        }
    }

    async fn evict(&self, deadline: &Deadline, slots: &[Slot]) {
        if !self.options.invalidate_on_write {
            return;
        }
        for slot in slots {
            match deadline
                .try_run(self.cache.invalidate(slot.tag_id, slot.feature_id))
                .await
            {
                Some(Ok(())) => {}
                Some(Err(e)) => warn!(slot = %slot, error = %e, "cache invalidation failed"),
                None => {
                    warn!(slot = %slot, "cache invalidation timed out");
                    break;
                }
            }
        }
    }
}
