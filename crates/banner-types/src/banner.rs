//! Banner types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored banner together with the tags it currently holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub banner_id: i64,
    pub tag_ids: Vec<i64>,
    pub feature_id: i64,
    /// Opaque JSON document shown to users
    pub content: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Banner creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBanner {
    pub feature_id: i64,
    pub tag_ids: Vec<i64>,
    pub content: Value,
    pub is_active: bool,
}

impl NewBanner {
    pub fn new(feature_id: i64, tag_ids: Vec<i64>, content: Value, is_active: bool) -> Self {
        Self {
            feature_id,
            tag_ids,
            content,
            is_active,
        }
    }
}

/// Partial banner update.
///
/// `None` leaves the stored value untouched. An explicit empty `tag_ids`
/// is a change, not an absence: it upserts nothing, but combined with a new
/// `feature_id` it leaves the banner without tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BannerPatch {
    pub feature_id: Option<i64>,
    pub tag_ids: Option<Vec<i64>>,
    pub content: Option<Value>,
    pub is_active: Option<bool>,
}

impl BannerPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature_id(mut self, feature_id: i64) -> Self {
        self.feature_id = Some(feature_id);
        self
    }

    pub fn tag_ids(mut self, tag_ids: Vec<i64>) -> Self {
        self.tag_ids = Some(tag_ids);
        self
    }

    pub fn content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn is_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    /// True when no field was supplied; only `updated_at` would change.
    pub fn is_empty(&self) -> bool {
        self.feature_id.is_none()
            && self.tag_ids.is_none()
            && self.content.is_none()
            && self.is_active.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_builder() {
        let patch = BannerPatch::new().is_active(false).tag_ids(vec![3]);
        assert_eq!(patch.is_active, Some(false));
        assert_eq!(patch.tag_ids, Some(vec![3]));
        assert!(patch.feature_id.is_none());
        assert!(patch.content.is_none());
        assert!(!patch.is_empty());
        assert!(BannerPatch::new().is_empty());
    }

    #[test]
    fn test_banner_serializes_with_wire_names() {
        let now = Utc::now();
        let banner = Banner {
            banner_id: 1,
            tag_ids: vec![1, 2],
            feature_id: 4,
            content: json!({"title": "hello"}),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(&banner).unwrap();
        assert_eq!(value["banner_id"], 1);
        assert_eq!(value["tag_ids"], json!([1, 2]));
        assert_eq!(value["content"]["title"], "hello");
    }
}
