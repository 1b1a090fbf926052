//! Process configuration, read from the environment with code defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use actors::WorkerPoolConfig;
use cache::CacheConfig;
use resilience::{RateLimiterConfig, RetryPolicy};

use crate::resilient_source::{source_rate_limit, source_retry_policy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything needed to build a [`crate::QueueManager`] and its source.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    pub pool: WorkerPoolConfig,
    /// Retry budget given to every submitted job.
    pub max_retries: u32,
    pub cache: CacheConfig,
    pub source_rate_limit: RateLimiterConfig,
    pub source_retry: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPoolConfig::default(),
            max_retries: 3,
            cache: CacheConfig::default(),
            source_rate_limit: source_rate_limit(),
            source_retry: source_retry_policy(),
        }
    }
}

impl ManagerConfig {
    pub fn with_pool(mut self, pool: WorkerPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Build a config from environment variables.
    ///
    /// Unset or blank variables keep their defaults:
    /// - `QUEUE_WORKERS` (default: 4)
    /// - `QUEUE_POLL_INTERVAL_MS` (default: 100)
    /// - `QUEUE_MAX_RETRIES` (default: 3)
    /// - `CACHE_MEMORY_TTL_SECS` (default: 3600)
    /// - `CACHE_DISK_TTL_SECS` (default: 86400)
    /// - `CACHE_CLEANUP_INTERVAL_SECS` (default: 3600)
    /// - `CACHE_DIR` (default: `./data/cache`)
    /// - `SOURCE_RATE_LIMIT_CALLS` (default: 3)
    /// - `SOURCE_RATE_LIMIT_PERIOD_MS` (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(workers) = parse_env::<usize>("QUEUE_WORKERS")? {
            if workers == 0 {
                return Err(ConfigError::Invalid(
                    "QUEUE_WORKERS must be at least 1".to_string(),
                ));
            }
            cfg.pool.workers = workers;
        }
        if let Some(ms) = parse_env::<u64>("QUEUE_POLL_INTERVAL_MS")? {
            cfg.pool.poll_interval = Duration::from_millis(ms);
        }
        if let Some(max_retries) = parse_env::<u32>("QUEUE_MAX_RETRIES")? {
            cfg.max_retries = max_retries;
        }

        if let Some(secs) = parse_env::<u64>("CACHE_MEMORY_TTL_SECS")? {
            cfg.cache.memory_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("CACHE_DISK_TTL_SECS")? {
            cfg.cache.disk_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("CACHE_CLEANUP_INTERVAL_SECS")? {
            cfg.cache.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(dir) = std::env::var("CACHE_DIR").ok().and_then(non_empty) {
            cfg.cache.cache_dir = PathBuf::from(dir);
        }

        if let Some(calls) = parse_env::<usize>("SOURCE_RATE_LIMIT_CALLS")? {
            if calls == 0 {
                return Err(ConfigError::Invalid(
                    "SOURCE_RATE_LIMIT_CALLS must be at least 1".to_string(),
                ));
            }
            cfg.source_rate_limit.calls = calls;
        }
        if let Some(ms) = parse_env::<u64>("SOURCE_RATE_LIMIT_PERIOD_MS")? {
            cfg.source_rate_limit.period = Duration::from_millis(ms);
        }

        Ok(cfg)
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_env<T: FromStr>(var_name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let v = match std::env::var(var_name) {
        Ok(v) => v,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(ConfigError::Invalid(format!(
                "failed reading {var_name}: {e}"
            )));
        }
    };

    let Some(v) = non_empty(v) else {
        return Ok(None);
    };
    v.parse()
        .map(Some)
        .map_err(|e| ConfigError::Invalid(format!("invalid value for {var_name}={v}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.pool.workers, 4);
        assert_eq!(cfg.pool.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.pool.join_timeout, Duration::from_secs(1));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.cache.memory_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.cache.disk_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.cache.cache_dir, PathBuf::from("./data/cache"));
        assert_eq!(cfg.source_rate_limit.calls, 3);
    }

    #[test]
    fn blank_values_are_ignored() {
        assert_eq!(non_empty("   ".to_string()), None);
        assert_eq!(non_empty(" ./cache ".to_string()), Some("./cache".to_string()));
    }

    #[test]
    fn unset_variable_parses_to_none() {
        let parsed = parse_env::<u64>("QUEUE_TEST_SURELY_UNSET_VARIABLE");
        assert!(matches!(parsed, Ok(None)));
    }
}
