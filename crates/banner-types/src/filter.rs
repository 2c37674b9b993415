//! Banner list filters

use serde::{Deserialize, Serialize};

/// Query definition used to filter and page banner listings.
///
/// Pages are taken over banners ordered by id, so `offset` is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerFilter {
    pub feature_id: Option<i64>,
    pub tag_id: Option<i64>,
    /// Maximum number of banners; `None` returns every match
    pub limit: Option<i64>,
    pub offset: i64,
}

impl BannerFilter {
    /// A filter matching every banner.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature(mut self, feature_id: i64) -> Self {
        self.feature_id = Some(feature_id);
        self
    }

    pub fn tag(mut self, tag_id: i64) -> Self {
        self.tag_id = Some(tag_id);
        self
    }

    pub fn paginate(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}
