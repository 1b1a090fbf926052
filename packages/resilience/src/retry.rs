//! Retry executor with classified errors and configurable backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Classify;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Always `base_delay`.
    Fixed,
    /// `base_delay * 2^attempt`, capped at `max_delay`.
    Exponential,
    /// Exponential plus a uniform random addend of up to half the delay.
    #[default]
    ExponentialJitter,
}

/// Retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first call.
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::ExponentialJitter,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            strategy: BackoffStrategy::Fixed,
            base_delay: delay,
            max_delay: delay,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the next attempt. `attempt` is 0-based: the delay after
    /// the first failure uses `attempt = 0`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => self.exponential(attempt),
            BackoffStrategy::ExponentialJitter => {
                let delay = self.exponential(attempt);
                let spread = delay.as_secs_f64() * 0.5;
                if spread <= 0.0 {
                    return delay;
                }
                let jitter = rand::thread_rng().gen_range(0.0..=spread);
                delay + Duration::from_secs_f64(jitter)
            }
        }
    }

    fn exponential(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;
type RetryCallback<E> = Box<dyn Fn(&E, u32, Duration) + Send + Sync>;

/// Runs an async operation until it succeeds, fails with a non-retryable
/// error, or exhausts `max_attempts`.
pub struct Retry<E> {
    policy: RetryPolicy,
    predicates: Vec<Predicate<E>>,
    on_retry: Option<RetryCallback<E>>,
}

impl<E> std::fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("policy", &self.policy)
            .field("predicates", &self.predicates.len())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl<E: Classify + Display> Retry<E> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            predicates: Vec::new(),
            on_retry: None,
        }
    }

    /// Also retry errors matching `predicate`, on top of the built-in
    /// classification.
    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Called before each backoff sleep with the error, the number of failed
    /// attempts so far and the delay about to be slept.
    pub fn on_retry(mut self, callback: impl Fn(&E, u32, Duration) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Box::new(callback));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        self.predicates.iter().any(|matches| matches(error))
            || error.transient_kind().is_some()
            || error.is_retryable()
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0u32;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            attempt += 1;

            if attempt >= max_attempts {
                tracing::error!("Giving up after attempt {}/{}: {}", attempt, max_attempts, error);
                return Err(error);
            }

            if !self.is_retryable(&error) {
                tracing::error!(
                    "Non-retryable error on attempt {}/{}: {}",
                    attempt,
                    max_attempts,
                    error
                );
                return Err(error);
            }

            let delay = self.policy.delay_for_attempt(attempt - 1);
            tracing::warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}",
                attempt,
                max_attempts,
                error,
                delay
            );
            if let Some(callback) = &self.on_retry {
                callback(&error, attempt, delay);
            }
            drop(error);

            tokio::time::sleep(delay).await;
        }
    }
}
