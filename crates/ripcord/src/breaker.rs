// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Circuit breaking for a failing downstream dependency.
//!
//! A [`CircuitBreaker`] stops calling a dependency for a cooldown period after
//! repeated failures. The failure bookkeeping itself is delegated to an
//! injected [`FailureAccrual`] policy, so trip conditions (consecutive
//! failures, failures within a window, caller-defined) are pluggable without
//! touching the breaker's admission logic.
//!
//! One breaker instance is meant to be shared by every caller hitting the same
//! logical dependency.

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Rejection;

/// Failure/success bookkeeping behind a [`CircuitBreaker`].
///
/// Implementations count outcomes however they like; the breaker only asks
/// whether the accumulated history warrants tripping. All methods must be safe
/// to call from many threads at once.
pub trait FailureAccrual: Send + Sync + Debug {
    /// Records a successful call. Returns `true` if the policy is tripped
    /// after recording.
    fn record_success(&self) -> bool;

    /// Records a failed call. Returns `true` if the policy is tripped after
    /// recording.
    fn record_failure(&self) -> bool;

    /// Returns `true` if the accumulated history warrants keeping the circuit
    /// open.
    fn is_tripped(&self) -> bool;

    /// Clears all accumulated history.
    fn reset(&self);
}

/// Trips after N failures in a row; any success resets the streak.
#[derive(Debug)]
pub struct ConsecutiveFailures {
    threshold: u32,
    streak: AtomicU32,
}

impl ConsecutiveFailures {
    /// Trips once `threshold` consecutive failures have been recorded.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            streak: AtomicU32::new(0),
        }
    }
}

impl FailureAccrual for ConsecutiveFailures {
    fn record_success(&self) -> bool {
        self.streak.store(0, Ordering::Relaxed);
        false
    }

    fn record_failure(&self) -> bool {
        let streak = self.streak.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        streak >= self.threshold
    }

    fn is_tripped(&self) -> bool {
        self.streak.load(Ordering::Relaxed) >= self.threshold
    }

    fn reset(&self) {
        self.streak.store(0, Ordering::Relaxed);
    }
}

/// Trips after N failures within a sliding time window.
///
/// Successes do not clear the window; only time does.
#[derive(Debug)]
pub struct WindowedFailures {
    threshold: usize,
    window: Duration,
    failures: Mutex<Vec<Instant>>,
}

impl WindowedFailures {
    /// Trips once `threshold` failures have been recorded within `window`.
    #[must_use]
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            failures: Mutex::new(Vec::new()),
        }
    }

    fn prune(&self, failures: &mut Vec<Instant>, now: Instant) {
        failures.retain(|at| now.saturating_duration_since(*at) < self.window);
    }
}

impl FailureAccrual for WindowedFailures {
    fn record_success(&self) -> bool {
        self.is_tripped()
    }

    fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut failures = self.failures.lock();
        failures.push(now);
        self.prune(&mut failures, now);
        failures.len() >= self.threshold
    }

    fn is_tripped(&self) -> bool {
        let mut failures = self.failures.lock();
        self.prune(&mut failures, Instant::now());
        failures.len() >= self.threshold
    }

    fn reset(&self) {
        self.failures.lock().clear();
    }
}

/// Gate that stops calls to a dependency for a cooldown after it trips.
///
/// While tripped and within `cooldown` of the trip, [`allow`][Self::allow]
/// returns `false`. Once the cooldown elapses, `allow` returns `true` again
/// even though the accrual policy has not been reset; this is the trial
/// window. A failure during the trial re-trips immediately, a success resets
/// the accrual policy and closes the circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    accrual: Box<dyn FailureAccrual>,
    cooldown: Duration,
    tripped_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given accrual policy and cooldown.
    #[must_use]
    pub fn new(accrual: impl FailureAccrual + 'static, cooldown: Duration) -> Self {
        Self {
            accrual: Box::new(accrual),
            cooldown,
            tripped_at: Mutex::new(None),
        }
    }

    /// Returns `false` only while tripped and within the cooldown.
    #[must_use]
    pub fn allow(&self) -> bool {
        match *self.tripped_at.lock() {
            Some(at) => at.elapsed() >= self.cooldown,
            None => true,
        }
    }

    /// Records a successful call, closing the circuit if it was tripped.
    pub fn on_success(&self) {
        self.accrual.record_success();
        let mut tripped_at = self.tripped_at.lock();
        if tripped_at.take().is_some() {
            self.accrual.reset();
            tracing::debug!("circuit closed after successful trial");
        }
    }

    /// Records a failed call, tripping (or re-tripping) if the accrual policy
    /// says so.
    pub fn on_failure(&self) {
        if self.accrual.record_failure() {
            let mut tripped_at = self.tripped_at.lock();
            if tripped_at.is_none() {
                tracing::debug!(cooldown = ?self.cooldown, "circuit tripped");
            }
            *tripped_at = Some(Instant::now());
        }
    }

    /// Returns `true` if the breaker has tripped and not yet been reset.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.tripped_at.lock().is_some()
    }
}

/// Runs `op` behind `breaker`.
///
/// When the breaker refuses admission the work is not invoked and the call
/// fails with [`Rejection::CircuitOpen`]. Otherwise the outcome is recorded on
/// the breaker and surfaced unchanged.
///
/// # Errors
///
/// [`Rejection::CircuitOpen`] (through `E`) on denial, or the work's own error.
pub async fn circuit_break<T, E, F, Fut>(breaker: &CircuitBreaker, op: F) -> Result<T, E>
where
    E: From<Rejection>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !breaker.allow() {
        tracing::debug!("call denied, circuit is open");
        return Err(Rejection::CircuitOpen.into());
    }

    match op().await {
        Ok(value) => {
            breaker.on_success();
            Ok(value)
        }
        Err(error) => {
            breaker.on_failure();
            Err(error)
        }
    }
}
