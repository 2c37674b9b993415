//! Relational store trait

use crate::Result;
use async_trait::async_trait;
use banner_types::{Banner, BannerFilter, BannerPatch, NewBanner, Slot};
use serde_json::Value;

/// Durable source of truth for banners and their tag slots.
///
/// Implementations must classify driver errors into [`crate::BannerError`]
/// where they happen; anything unclassified is `Internal`.
#[async_trait]
pub trait BannerStore: Send + Sync {
    /// Insert a banner and all of its tag slots atomically.
    ///
    /// A taken slot fails the whole call with `AlreadyExists`; an unknown
    /// tag or feature fails it with `InvalidData`.
    async fn create_banner(&self, banner: &NewBanner) -> Result<i64>;

    /// Apply a partial update and return every slot whose content may have
    /// changed, including slots dropped by a feature change and slots taken
    /// over from other banners.
    async fn update_banner(&self, banner_id: i64, patch: &BannerPatch) -> Result<Vec<Slot>>;

    /// Delete a banner and its slots, returning the slots it held.
    async fn delete_banner(&self, banner_id: i64) -> Result<Vec<Slot>>;

    /// Content of the banner holding `(tag_id, feature_id)`.
    async fn get_banner(&self, tag_id: i64, feature_id: i64) -> Result<Value>;

    /// A single banner with its tags; `NotExists` when the id is unknown.
    async fn get_banner_by_id(&self, banner_id: i64) -> Result<Banner>;

    async fn list_banners(&self, filter: &BannerFilter) -> Result<Vec<Banner>>;

    /// Make sure the referenced feature and tag rows exist.
    async fn register_references(&self, feature_id: Option<i64>, tag_ids: &[i64]) -> Result<()>;
}
