//! Cache layer trait

use crate::Result;
use async_trait::async_trait;

/// Key-value accelerator for the `tag:feature -> content` read path.
///
/// Keys are built with [`banner_types::cache_key`]. Entries carry no TTL.
#[async_trait]
pub trait BannerCache: Send + Sync {
    /// Unconditionally store `content` for the slot. Failures are reported
    /// as `InvalidData`.
    async fn set_banner(&self, tag_id: i64, feature_id: i64, content: &[u8]) -> Result<()>;

    /// Look up raw content by key. Both a miss and an unavailable backend
    /// are reported as `NotFound`.
    async fn get_banner(&self, key: &str) -> Result<Vec<u8>>;

    /// Drop the entry for the slot, if any.
    async fn invalidate(&self, tag_id: i64, feature_id: i64) -> Result<()>;
}
