//! Resilience primitives for calls to flaky collaborators.
//!
//! - [`Retry`] re-runs an operation on transient errors with backoff
//! - [`RateLimiter`] caps the call rate over a sliding window
//! - [`Classify`] decides which errors are transient

mod error;
mod rate_limit;
mod retry;

pub use error::{Classify, TransientKind, classify_status};
pub use rate_limit::{RateLimitError, RateLimiter, RateLimiterConfig};
pub use retry::{BackoffStrategy, Retry, RetryPolicy};
