// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Token-bucket rate controls.
//!
//! One bucket algorithm backs two controls with different placement:
//! [`RateLimiter`] gates the unit of work itself through
//! [`with_rate_limit`], while [`RetryBudget`] gates the *retry decision*
//! through [`with_budget`][crate::policy::with_budget], capping total retry
//! volume independent of any per-call policy.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Rejection;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

/// A bucket of tokens that refills continuously up to a fixed capacity.
///
/// Refill happens lazily on each [`try_acquire`][Self::try_acquire], credited
/// as `elapsed_seconds * refill_per_second`, so an idle bucket costs nothing.
/// The bucket starts full.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket holding at most `capacity` tokens.
    #[must_use]
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_second: refill_per_second.max(0.0),
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Takes one token if at least one is available after refilling.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.refilled_at);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_per_second).min(self.capacity);
        state.refilled_at = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, without refilling.
    #[must_use]
    pub fn available(&self) -> f64 {
        self.state.lock().tokens
    }
}

/// Token-bucket admission gate for the unit of work itself.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: TokenBucket,
}

impl RateLimiter {
    /// Allows bursts of up to `capacity` calls, sustained at
    /// `refill_per_second` calls per second.
    #[must_use]
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            bucket: TokenBucket::new(capacity, refill_per_second),
        }
    }

    /// Attempts to admit one call.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.bucket.try_acquire()
    }
}

/// Rate cap on retries, shared across many executor runs.
///
/// The budget is not consulted for initial calls, only when a policy has
/// already voted to retry; see [`with_budget`][crate::policy::with_budget].
#[derive(Debug)]
pub struct RetryBudget {
    bucket: TokenBucket,
}

impl RetryBudget {
    /// Allows bursts of up to `capacity` retries, sustained at
    /// `refill_per_second` retries per second.
    #[must_use]
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            bucket: TokenBucket::new(capacity, refill_per_second),
        }
    }

    /// Attempts to spend one retry token.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.bucket.try_acquire()
    }
}

/// Runs `op` if the rate limiter admits it.
///
/// On denial the work is not invoked and the call fails with
/// [`Rejection::RateLimited`].
///
/// # Errors
///
/// [`Rejection::RateLimited`] (through `E`) on denial, or the work's own error.
pub async fn with_rate_limit<T, E, F, Fut>(limiter: &RateLimiter, op: F) -> Result<T, E>
where
    E: From<Rejection>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !limiter.try_acquire() {
        tracing::debug!("call denied, rate limit exceeded");
        return Err(Rejection::RateLimited.into());
    }

    op().await
}
