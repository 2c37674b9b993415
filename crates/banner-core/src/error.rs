//! Error types for the banner storage engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BannerError>;

/// Closed error taxonomy returned by every store, cache and service call.
///
/// Each variant carries the failing operation and a short detail so logs
/// stay useful; callers only match on the variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BannerError {
    /// Malformed or missing input, type mismatch, failed precondition
    #[error("Invalid banner data: {0}")]
    InvalidData(String),

    /// Read miss (a cache miss is also reported this way)
    #[error("Banner not found: {0}")]
    NotFound(String),

    /// A `(tag, feature)` slot is already taken
    #[error("Banner already exists: {0}")]
    AlreadyExists(String),

    /// Target of a mutation or deletion is absent
    #[error("Banner does not exist: {0}")]
    NotExists(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BannerError {
    /// Short machine-readable code for the variant.
    pub fn code(&self) -> &'static str {
        match self {
            BannerError::InvalidData(_) => "invalid_data",
            BannerError::NotFound(_) => "not_found",
            BannerError::AlreadyExists(_) => "already_exists",
            BannerError::NotExists(_) => "not_exists",
            BannerError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for BannerError {
    fn from(e: serde_json::Error) -> Self {
        BannerError::Internal(format!("serialization: {}", e))
    }
}
