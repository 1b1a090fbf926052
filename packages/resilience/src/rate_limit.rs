//! Sliding-window rate limiter.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Classify, TransientKind};

/// Extra wait added after the oldest call leaves the window.
const WAIT_BUFFER: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded: {calls} calls per {period:?}, try again in {retry_after:?}")]
    Exceeded {
        calls: usize,
        period: Duration,
        retry_after: Duration,
    },
}

impl Classify for RateLimitError {
    fn transient_kind(&self) -> Option<TransientKind> {
        Some(TransientKind::TooManyRequests)
    }
}

/// Configuration for a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Maximum calls admitted per window. `RateLimiter::new` raises 0 to 1.
    pub calls: usize,
    /// Length of the sliding window.
    pub period: Duration,
    /// Reject over-limit calls instead of waiting for capacity.
    pub raise_on_limit: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            calls: 10,
            period: Duration::from_secs(1),
            raise_on_limit: true,
        }
    }
}

impl RateLimiterConfig {
    pub fn new(calls: usize, period: Duration) -> Self {
        Self {
            calls,
            period,
            ..Default::default()
        }
    }

    /// Wait for capacity instead of failing.
    pub fn blocking(mut self) -> Self {
        self.raise_on_limit = false;
        self
    }
}

/// Caps calls to `calls` per sliding `period`.
///
/// The call history lock is held while a blocked caller waits, so waiting
/// callers are admitted one at a time in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Build a limiter. A `calls` of 0 is raised to 1 with a warning.
    pub fn new(mut config: RateLimiterConfig) -> Self {
        if config.calls == 0 {
            tracing::warn!("Rate limiter configured with 0 calls per period, using 1");
            config.calls = 1;
        }
        tracing::info!(
            "Initialized rate limiter: {} calls per {:?}",
            config.calls,
            config.period
        );
        Self {
            history: Mutex::new(VecDeque::with_capacity(config.calls)),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Admit one call, honouring `raise_on_limit`.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        self.admit(self.config.raise_on_limit).await
    }

    /// Admit one call, always waiting for capacity.
    pub async fn wait_if_needed(&self) {
        // Never fails when not raising.
        let _ = self.admit(false).await;
    }

    /// Run `operation` once it has been admitted.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, RateLimitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await?;
        Ok(operation().await)
    }

    async fn admit(&self, raise_on_limit: bool) -> Result<(), RateLimitError> {
        let mut history = self.history.lock().await;
        let mut now = Instant::now();
        prune(&mut history, now, self.config.period);

        if history.len() >= self.config.calls
            && let Some(&oldest) = history.front()
        {
            let retry_after = self
                .config
                .period
                .saturating_sub(now.duration_since(oldest));

            if raise_on_limit {
                return Err(RateLimitError::Exceeded {
                    calls: self.config.calls,
                    period: self.config.period,
                    retry_after,
                });
            }

            tracing::debug!(
                "Rate limit reached, waiting {:?}",
                retry_after + WAIT_BUFFER
            );
            tokio::time::sleep(retry_after + WAIT_BUFFER).await;
            now = Instant::now();
            prune(&mut history, now, self.config.period);
        }

        history.push_back(now);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

fn prune(history: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while let Some(&oldest) = history.front() {
        if now.duration_since(oldest) > period {
            history.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_limiter_spaces_calls_by_period() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(1, Duration::from_secs(1)).blocking());
        let started = std::time::Instant::now();

        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }

        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn raising_limiter_rejects_over_limit_calls() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(2, Duration::from_secs(60)));

        assert!(limiter.acquire().await.is_ok());
        assert_eq!(limiter.call(|| async { 7 }).await, Ok(7));

        let err = limiter.acquire().await.unwrap_err();
        let RateLimitError::Exceeded {
            calls, retry_after, ..
        } = err.clone();
        assert_eq!(calls, 2);
        assert!(retry_after <= Duration::from_secs(60));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("try again"));
    }

    #[tokio::test]
    async fn wait_if_needed_blocks_even_when_raising() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(1, Duration::from_millis(100)));
        let started = std::time::Instant::now();

        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;

        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn window_slides() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(1, Duration::from_millis(50)));

        limiter.acquire().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn zero_calls_admits_one_call_per_window() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(0, Duration::from_secs(60)));
        assert_eq!(limiter.config().calls, 1);

        assert!(limiter.acquire().await.is_ok());
        assert!(limiter.acquire().await.is_err());
    }
}
