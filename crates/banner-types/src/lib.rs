//! Banner Types - Pure type definitions
//!
//! This crate contains only plain data types shared by the storage engine
//! and its callers, with no async runtime or database dependencies.

pub mod banner;
pub mod filter;
pub mod slot;

pub use banner::*;
pub use filter::*;
pub use slot::*;
