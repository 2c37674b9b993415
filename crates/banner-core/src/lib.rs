//! Banner Core Library
//!
//! Error taxonomy, port traits and input validation for the banner storage
//! engine. Concrete stores and caches live in the server crate.

// Re-export pure types from banner-types
pub use banner_types::*;

pub mod error;
pub mod ports;
pub mod validate;

pub use error::{BannerError, Result};
pub use ports::{BannerCache, BannerStore};
