//! Tag/feature slot types

use serde::{Deserialize, Serialize};

/// Build the cache key for a `(tag, feature)` pair.
pub fn cache_key(tag_id: i64, feature_id: i64) -> String {
    format!("{}:{}", tag_id, feature_id)
}

/// A `(tag_id, feature_id)` association.
///
/// Each slot is held by at most one banner at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub tag_id: i64,
    pub feature_id: i64,
}

impl Slot {
    pub fn new(tag_id: i64, feature_id: i64) -> Self {
        Self { tag_id, feature_id }
    }

    pub fn cache_key(&self) -> String {
        cache_key(self.tag_id, self.feature_id)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tag_id, self.feature_id)
    }
}
