//! Two-tier cache: an in-memory tier in front of a JSON file tier.
//!
//! Values are `serde_json::Value`s with absolute expiry. Build one
//! [`CacheManager`] at startup and share it; there is no global instance.

mod disk;
mod entry;
mod error;
mod manager;
mod memoize;
mod memory;

pub use disk::{DiskCache, hash_key};
pub use entry::{CacheEntry, CacheStats, CleanupReport, TierStats};
pub use error::CacheError;
pub use manager::{CacheConfig, CacheManager};
pub use memoize::{CacheOptions, memo_key};
pub use memory::MemoryCache;
