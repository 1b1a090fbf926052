//! Caching, rate limiting and retry around a literature source.

use std::sync::Arc;
use std::time::Duration;

use cache::{CacheManager, CacheOptions};
use resilience::{BackoffStrategy, RateLimiter, RateLimiterConfig, Retry, RetryPolicy};

use crate::collaborators::{LiteratureSource, SourceError, SourceFuture};

/// How long fetched texts stay on disk.
pub const TEXT_CACHE_TTL: Duration = Duration::from_secs(86_400);

/// Wraps a [`LiteratureSource`] so that every fetch goes through the cache
/// first, then the rate limiter, then the retry executor.
///
/// Only the first attempt of a fetch is counted by the limiter; retries
/// reuse that admission.
pub struct ResilientSource<S> {
    inner: S,
    cache: Arc<CacheManager>,
    limiter: Arc<RateLimiter>,
    retry: Retry<SourceError>,
    cache_options: CacheOptions,
}

impl<S: LiteratureSource> ResilientSource<S> {
    pub fn new(
        inner: S,
        cache: Arc<CacheManager>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner,
            cache,
            limiter,
            retry: Retry::new(retry),
            cache_options: CacheOptions::default()
                .with_prefix("abstract:")
                .with_ttl(TEXT_CACHE_TTL)
                .on_disk(),
        }
    }

    pub fn with_cache_options(mut self, options: CacheOptions) -> Self {
        self.cache_options = options;
        self
    }

    pub fn with_retry(mut self, retry: Retry<SourceError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Limiter settings for a remote literature API: 3 calls a second,
/// waiting for capacity.
pub fn source_rate_limit() -> RateLimiterConfig {
    RateLimiterConfig::new(3, Duration::from_secs(1)).blocking()
}

/// Retry settings for a remote literature API.
pub fn source_retry_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(3)
        .with_strategy(BackoffStrategy::ExponentialJitter)
        .with_base_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(30))
}

impl<S: LiteratureSource> LiteratureSource for ResilientSource<S> {
    fn fetch_text<'a>(&'a self, article_id: &'a str) -> SourceFuture<'a> {
        Box::pin(async move {
            self.cache
                .cached("fetch_text", article_id, &self.cache_options, || async {
                    self.limiter.acquire().await?;
                    self.retry.run(|| self.inner.fetch_text(article_id)).await
                })
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use cache::CacheConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a timeout `failures` times, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl LiteratureSource for Flaky {
        fn fetch_text<'a>(&'a self, article_id: &'a str) -> SourceFuture<'a> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if article_id == "missing" {
                    return Err(SourceError::NotFound(article_id.to_string()));
                }
                if n < self.failures {
                    Err(SourceError::Timeout)
                } else {
                    Ok(format!("abstract of {article_id}"))
                }
            })
        }
    }

    fn wrap(failures: u32, dir: &std::path::Path) -> ResilientSource<Flaky> {
        ResilientSource::new(
            Flaky {
                failures,
                calls: AtomicU32::new(0),
            },
            Arc::new(CacheManager::new(CacheConfig::default().with_cache_dir(dir))),
            Arc::new(RateLimiter::new(
                RateLimiterConfig::new(10, Duration::from_secs(1)).blocking(),
            )),
            RetryPolicy::fixed(3, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_cached() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = wrap(2, dir.path());

        assert_eq!(source.fetch_text("PMC7").await?, "abstract of PMC7");
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 3);

        assert_eq!(source.fetch_text("PMC7").await?, "abstract of PMC7");
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = wrap(0, dir.path());

        let err = source.fetch_text("missing").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = wrap(10, dir.path());

        let err = source.fetch_text("PMC9").await.unwrap_err();
        assert!(matches!(err, SourceError::Timeout));
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[test]
    fn default_limits_follow_the_remote_api() {
        let limit = source_rate_limit();
        assert_eq!(limit.calls, 3);
        assert!(!limit.raise_on_limit);
        assert_eq!(source_retry_policy().max_delay, Duration::from_secs(30));
    }
}
