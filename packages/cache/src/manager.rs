//! Two-tier cache front end.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::disk::DiskCache;
use crate::entry::{CacheEntry, CacheStats, CleanupReport};
use crate::error::CacheError;
use crate::memory::MemoryCache;

/// Configuration for the two cache tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default TTL for the memory tier, also used for promoted entries.
    pub memory_ttl: Duration,
    /// Default TTL for the disk tier.
    pub disk_ttl: Duration,
    /// Minimum time between automatic cleanup sweeps.
    pub cleanup_interval: Duration,
    /// Directory for disk entries.
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl: Duration::from_secs(3600),
            disk_ttl: Duration::from_secs(86_400),
            cleanup_interval: Duration::from_secs(3600),
            cache_dir: PathBuf::from("./data/cache"),
        }
    }
}

impl CacheConfig {
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl = ttl;
        self
    }

    pub fn with_disk_ttl(mut self, ttl: Duration) -> Self {
        self.disk_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct LastCleanup {
    at: Instant,
    wall: DateTime<Utc>,
}

/// Memory tier in front of a disk tier.
///
/// Reads check memory first and fall back to disk when asked; a disk hit is
/// copied into memory. Expired entries are dropped lazily on read, and a
/// full sweep runs from `get` once `cleanup_interval` has passed.
#[derive(Debug)]
pub struct CacheManager {
    config: CacheConfig,
    memory: MemoryCache,
    disk: DiskCache,
    last_cleanup: Mutex<LastCleanup>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        tracing::info!("Initialized cache manager at {:?}", config.cache_dir);
        Self {
            memory: MemoryCache::new(config.memory_ttl),
            disk: DiskCache::new(&config.cache_dir, config.disk_ttl),
            last_cleanup: Mutex::new(LastCleanup {
                at: Instant::now(),
                wall: Utc::now(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn get(&self, key: &str, use_disk: bool) -> Option<Value> {
        self.maybe_cleanup().await;

        if let Some(value) = self.memory.get(key) {
            tracing::debug!("Memory cache hit for {}", key);
            return Some(value);
        }

        if !use_disk {
            return None;
        }

        // The disk lock is released before the memory tier is touched.
        let entry = self.disk.get_entry(key).await?;
        tracing::debug!("Disk cache hit for {}, promoting", key);
        self.memory.insert(CacheEntry::new(
            key,
            entry.value.clone(),
            self.memory.default_ttl(),
        ));
        Some(entry.value)
    }

    pub async fn set(
        &self,
        key: &str,
        value: Value,
        memory_ttl: Option<Duration>,
        disk_ttl: Option<Duration>,
        use_disk: bool,
    ) -> Result<(), CacheError> {
        if use_disk {
            self.memory.set(key, value.clone(), memory_ttl);
            self.disk.set(key, value, disk_ttl).await
        } else {
            self.memory.set(key, value, memory_ttl);
            Ok(())
        }
    }

    /// Typed read. A value that no longer deserializes is a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str, use_disk: bool) -> Option<T> {
        let value = self.get(key, use_disk).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::warn!("Cached value for {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Typed write using the tier default TTLs.
    pub async fn set_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        use_disk: bool,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, None, None, use_disk).await
    }

    /// Delete from memory and, when asked, from disk.
    pub async fn delete(&self, key: &str, use_disk: bool) -> Result<bool, CacheError> {
        let memory_deleted = self.memory.delete(key);
        let disk_deleted = if use_disk {
            self.disk.delete(key).await?
        } else {
            false
        };
        Ok(memory_deleted || disk_deleted)
    }

    pub async fn clear(&self, use_disk: bool) -> Result<(), CacheError> {
        self.memory.clear();
        if use_disk {
            self.disk.clear().await?;
        }
        Ok(())
    }

    /// Sweep expired entries out of both tiers.
    pub async fn cleanup(&self) -> Result<CleanupReport, CacheError> {
        let memory_removed = self.memory.cleanup();
        let disk_removed = self.disk.cleanup().await?;

        tracing::info!(
            "Cache cleanup: removed {} memory items, {} disk items",
            memory_removed,
            disk_removed
        );
        Ok(CleanupReport {
            memory_removed,
            disk_removed,
        })
    }

    pub async fn get_stats(&self) -> Result<CacheStats, CacheError> {
        let last_cleanup = self
            .last_cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .wall;
        Ok(CacheStats {
            memory: self.memory.stats(),
            disk: self.disk.stats().await?,
            last_cleanup,
        })
    }

    async fn maybe_cleanup(&self) {
        {
            let mut last = self
                .last_cleanup
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.at.elapsed() <= self.config.cleanup_interval {
                return;
            }
            *last = LastCleanup {
                at: Instant::now(),
                wall: Utc::now(),
            };
        }

        if let Err(e) = self.cleanup().await {
            tracing::warn!("Cache cleanup failed: {}", e);
        }
    }
}
