//! Cache entries and per-tier statistics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached value with an absolute expiry.
///
/// Entries are never mutated once built; setting a key always stores a
/// fresh entry. The same document is what the disk tier writes, so a file
/// can be validated without any index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub created: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Value, ttl: Duration) -> Self {
        let created = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            key: key.into(),
            value,
            created,
            expiry: created.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expiry
    }
}

/// Counters for a single cache tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub total_items: usize,
    pub valid_items: usize,
    /// Expired entries, plus unreadable files on disk.
    pub expired_items: usize,
    /// Bytes on disk. Always zero for the memory tier.
    pub size_bytes: u64,
}

/// Snapshot of both tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory: TierStats,
    pub disk: TierStats,
    pub last_cleanup: DateTime<Utc>,
}

/// Entries removed by a cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub memory_removed: usize,
    pub disk_removed: usize,
}
