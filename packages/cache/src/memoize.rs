//! Memoization of async calls through the [`CacheManager`].

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::disk::hash_key;
use crate::manager::CacheManager;

/// How a memoized call is keyed and stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// TTL for both tiers. `None` uses the tier defaults.
    pub ttl: Option<Duration>,
    pub use_disk: bool,
    /// Prepended to derived keys.
    pub key_prefix: String,
    /// Explicit key; skips key derivation.
    pub key: Option<String>,
}

impl CacheOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn on_disk(mut self) -> Self {
        self.use_disk = true;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Derive `"{prefix}{name}:{sha256(json(args))}"`.
///
/// serde_json maps keep their keys sorted, so equal arguments always
/// produce the same key.
pub fn memo_key<A: Serialize + ?Sized>(
    prefix: &str,
    name: &str,
    args: &A,
) -> Result<String, serde_json::Error> {
    let encoded = serde_json::to_string(&serde_json::to_value(args)?)?;
    Ok(format!("{prefix}{name}:{}", hash_key(&encoded)))
}

impl CacheManager {
    /// Return the cached result for `name(args)`, or run `compute` and cache
    /// its successful output.
    pub async fn cached<A, T, E, F, Fut>(
        &self,
        name: &str,
        args: &A,
        options: &CacheOptions,
        compute: F,
    ) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = match &options.key {
            Some(key) => key.clone(),
            None => match memo_key(&options.key_prefix, name, args) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!("Cannot derive cache key for {}: {}", name, e);
                    return compute().await;
                }
            },
        };

        if let Some(hit) = self.get_as::<T>(&key, options.use_disk).await {
            tracing::debug!("Cache hit for {}", key);
            return Ok(hit);
        }

        tracing::debug!("Cache miss for {}", key);
        let result = compute().await?;

        match serde_json::to_value(&result) {
            Ok(value) => {
                if let Err(e) = self
                    .set(&key, value, options.ttl, options.ttl, options.use_disk)
                    .await
                {
                    tracing::warn!("Failed to cache result for {}: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("Result for {} is not cacheable: {}", key, e),
        }

        Ok(result)
    }
}
