//! HTTP handlers

pub mod banners;
pub mod health;

pub use health::health;

use crate::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use banner_core::BannerError;
use serde_json::json;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/user_banner", get(banners::user_banner))
        .route("/banner", get(banners::list).post(banners::create))
        .route(
            "/banner/:id",
            get(banners::get)
                .patch(banners::update)
                .delete(banners::delete),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body `{"error": message}` with the taxonomy's status code.
#[derive(Debug)]
pub enum ApiError {
    Banner(BannerError),
    /// Unparseable path, query or body
    BadRequest(String),
}

impl From<BannerError> for ApiError {
    fn from(e: BannerError) -> Self {
        ApiError::Banner(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Banner(e) => {
                let status = match &e {
                    BannerError::InvalidData(_) => StatusCode::BAD_REQUEST,
                    BannerError::NotFound(_) | BannerError::NotExists(_) => StatusCode::NOT_FOUND,
                    BannerError::AlreadyExists(_) => StatusCode::CONFLICT,
                    BannerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Request failed: {}", e);
                    (status, "internal error".to_string())
                } else {
                    (status, e.to_string())
                }
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
