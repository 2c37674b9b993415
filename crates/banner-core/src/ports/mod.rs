//! Port traits (interfaces) for dependency injection

pub mod cache;
pub mod store;

pub use cache::BannerCache;
pub use store::BannerStore;
