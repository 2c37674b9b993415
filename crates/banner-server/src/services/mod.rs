//! Business logic services

pub mod banner_service;

pub use banner_service::{BannerService, ServiceOptions};
