//! In-process cache tier.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::entry::{CacheEntry, TierStats};

/// In-memory key/value tier with lazy expiry.
#[derive(Debug)]
pub struct MemoryCache {
    default_ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // Entries are immutable, so a poisoned map is still consistent.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live value. An expired entry is dropped and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store a value, replacing any previous entry. `None` uses the default TTL.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry::new(key, value, ttl.unwrap_or(self.default_ttl));
        self.entries().insert(key.to_string(), entry);
    }

    /// Store a prebuilt entry.
    pub fn insert(&self, entry: CacheEntry) {
        self.entries().insert(entry.key.clone(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Drop every expired entry and return how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub fn stats(&self) -> TierStats {
        let entries = self.entries();
        let expired_items = entries.values().filter(|e| e.is_expired()).count();
        TierStats {
            total_items: entries.len(),
            valid_items: entries.len() - expired_items,
            expired_items,
            size_bytes: 0,
        }
    }
}
