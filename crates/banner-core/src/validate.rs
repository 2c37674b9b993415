//! Precondition checks shared by store implementations

use crate::{BannerError, Result};
use banner_types::{BannerPatch, NewBanner};
use serde_json::Value;

/// Ids are store-assigned serials, so anything below 1 is rejected.
pub fn require_id(field: &str, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(BannerError::InvalidData(format!(
            "{} must be positive, got {}",
            field, id
        )));
    }
    Ok(())
}

/// Drop repeated tag ids, keeping first-seen order.
pub fn dedup_tags(tag_ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::with_capacity(tag_ids.len());
    tag_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn require_content(content: &Value) -> Result<()> {
    match content {
        Value::Null => Err(BannerError::InvalidData("content is required".to_string())),
        Value::String(s) if s.is_empty() => {
            Err(BannerError::InvalidData("content is empty".to_string()))
        }
        _ => Ok(()),
    }
}

fn require_tags(tag_ids: &[i64]) -> Result<Vec<i64>> {
    for tag_id in tag_ids {
        require_id("tag_id", *tag_id)?;
    }
    Ok(dedup_tags(tag_ids))
}

/// Validate a creation request and return it with duplicate tags removed.
pub fn new_banner(banner: &NewBanner) -> Result<NewBanner> {
    require_id("feature_id", banner.feature_id)?;
    require_content(&banner.content)?;
    if banner.tag_ids.is_empty() {
        return Err(BannerError::InvalidData(
            "at least one tag_id is required".to_string(),
        ));
    }
    let tag_ids = require_tags(&banner.tag_ids)?;

    Ok(NewBanner {
        tag_ids,
        ..banner.clone()
    })
}

/// Validate the supplied fields of a partial update.
pub fn patch(patch: &BannerPatch) -> Result<BannerPatch> {
    if let Some(feature_id) = patch.feature_id {
        require_id("feature_id", feature_id)?;
    }
    if let Some(content) = &patch.content {
        require_content(content)?;
    }
    let tag_ids = match &patch.tag_ids {
        Some(tag_ids) => Some(require_tags(tag_ids)?),
        None => None,
    };

    Ok(BannerPatch {
        tag_ids,
        ..patch.clone()
    })
}

/// Interpret a loosely typed `is_active` update field.
///
/// Absent, `null` and the empty string mean "leave unchanged"; a boolean
/// sets the flag; anything else is `InvalidData`.
pub fn is_active_field(value: Option<&Value>) -> Result<Option<bool>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(other) => Err(BannerError::InvalidData(format!(
            "is_active must be a boolean, got {}",
            other
        ))),
    }
}
