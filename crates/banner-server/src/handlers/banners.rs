//! Banner handlers

use super::ApiError;
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use banner_core::validate;
use banner_types::{Banner, BannerFilter, BannerPatch, NewBanner};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Ids of zero are sent by clients to mean "not supplied".
fn supplied(id: Option<i64>) -> Option<i64> {
    id.filter(|id| *id != 0)
}

#[derive(Debug, Deserialize)]
pub struct UserBannerQuery {
    tag_id: i64,
    feature_id: i64,
    #[serde(default)]
    use_last_revision: bool,
}

pub async fn user_banner(
    State(state): State<AppState>,
    query: Result<Query<UserBannerQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let content = state
        .service
        .get_banner(query.tag_id, query.feature_id, query.use_last_revision)
        .await?;

    Ok(Json(content))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    feature_id: Option<i64>,
    tag_id: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl From<ListQuery> for BannerFilter {
    fn from(query: ListQuery) -> Self {
        BannerFilter {
            feature_id: supplied(query.feature_id),
            tag_id: supplied(query.tag_id),
            limit: supplied(query.limit),
            offset: query.offset.unwrap_or(0),
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Banner>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let banners = state.service.list_banners(&query.into()).await?;

    Ok(Json(banners))
}

#[derive(Debug, Deserialize)]
pub struct CreateBannerRequest {
    #[serde(default)]
    tag_ids: Vec<i64>,
    #[serde(default)]
    feature_id: i64,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateBannerResponse {
    banner_id: i64,
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateBannerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateBannerResponse>), ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let banner = NewBanner::new(req.feature_id, req.tag_ids, req.content, req.is_active);
    let banner_id = state.service.create_banner(&banner).await?;

    Ok((StatusCode::CREATED, Json(CreateBannerResponse { banner_id })))
}

pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Banner>, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let banner = state.service.get_banner_by_id(id).await?;

    Ok(Json(banner))
}

/// Partial update body; absent and `null` fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateBannerRequest {
    tag_ids: Option<Vec<i64>>,
    feature_id: Option<i64>,
    content: Option<Value>,
    is_active: Option<Value>,
}

impl UpdateBannerRequest {
    fn into_patch(self) -> Result<BannerPatch, ApiError> {
        Ok(BannerPatch {
            feature_id: supplied(self.feature_id),
            tag_ids: self.tag_ids,
            content: self.content,
            is_active: validate::is_active_field(self.is_active.as_ref())?,
        })
    }
}

pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateBannerRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    state.service.update_banner(id, &req.into_patch()?).await?;

    Ok(Json(json!({ "status": "ok" })))
}

pub async fn delete(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    state.service.delete_banner(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
