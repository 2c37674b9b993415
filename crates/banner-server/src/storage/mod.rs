//! Storage layer
//!
//! Uses SQLite (embedded) as the system of record.
//! Caches either in-process (DashMap) or in Redis.

pub mod db;
pub mod memory;
pub mod query;
pub mod redis_cache;

pub use db::Database;
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;
