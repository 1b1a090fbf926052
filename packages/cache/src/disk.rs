//! File-backed cache tier.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::entry::{CacheEntry, TierStats};
use crate::error::CacheError;

const EXTENSION: &str = "cache";

/// Disk tier storing one JSON document per key.
///
/// File names are the SHA-256 of the key. Unreadable or corrupt files are
/// treated as misses and removed.
#[derive(Debug)]
pub struct DiskCache {
    /// Directory holding cache files.
    dir: PathBuf,
    default_ttl: Duration,
    lock: Mutex<()>,
}

impl DiskCache {
    pub fn new(dir: impl AsRef<Path>, default_ttl: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            default_ttl,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Ensure the cache directory exists.
    pub async fn init(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", hash_key(key)))
    }

    /// Read a live entry. Expired, unreadable and corrupt files are deleted.
    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read cache file {:?}: {}", path, e);
                remove_quietly(&path).await;
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.key != key => {
                tracing::warn!("Cache file {:?} holds a different key, removing", path);
                remove_quietly(&path).await;
                None
            }
            Ok(entry) if entry.is_expired() => {
                remove_quietly(&path).await;
                None
            }
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Corrupt cache file {:?}: {}", path, e);
                remove_quietly(&path).await;
                None
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    /// Write an entry via a temp file and rename. `None` uses the default TTL.
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, value, ttl.unwrap_or(self.default_ttl));
        let json = serde_json::to_vec(&entry)?;

        let _guard = self.lock.lock().await;
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let temp_path = path.with_extension(format!("{EXTENSION}.tmp"));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        tracing::debug!("Saved cache entry to {:?}", path);
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every cache file.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        for path in self.cache_files().await? {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    /// Remove expired and unreadable files, returning how many went.
    pub async fn cleanup(&self) -> Result<usize, CacheError> {
        let _guard = self.lock.lock().await;
        let mut removed = 0;

        for path in self.cache_files().await? {
            if !is_live(&path).await {
                remove_quietly(&path).await;
                removed += 1;
            }
        }

        Ok(removed)
    }

    pub async fn stats(&self) -> Result<TierStats, CacheError> {
        let _guard = self.lock.lock().await;
        let mut stats = TierStats::default();

        for path in self.cache_files().await? {
            stats.total_items += 1;
            if let Ok(meta) = fs::metadata(&path).await {
                stats.size_bytes += meta.len();
            }
            if is_live(&path).await {
                stats.valid_items += 1;
            } else {
                stats.expired_items += 1;
            }
        }

        Ok(stats)
    }

    async fn cache_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut files = Vec::new();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == EXTENSION) {
                files.push(path);
            }
        }

        Ok(files)
    }
}

/// Hex SHA-256 of a cache key.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn is_live(path: &Path) -> bool {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes).is_ok_and(|e| !e.is_expired()),
        Err(_) => false,
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!("Failed to remove cache file {:?}: {}", path, e);
    }
}
