// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Adaptive concurrency limiting with AIMD feedback.
//!
//! Where a [`Bulkhead`][crate::bulkhead::Bulkhead] enforces a fixed ceiling,
//! the [`AimdLimiter`] discovers one: the limit grows additively while calls
//! succeed and shrinks multiplicatively when the downstream signals pressure,
//! the same control law TCP uses for congestion avoidance.

use std::future::Future;

use parking_lot::Mutex;

use crate::error::Rejection;

/// Multiplicative-decrease factor applied on each dropped call.
const DEFAULT_DECREASE_FACTOR: f64 = 0.5;

/// Additive-increase step credited across one limit's worth of successes.
const DEFAULT_INCREASE: f64 = 1.0;

#[derive(Debug)]
struct AimdState {
    limit: f64,
    in_flight: u32,
}

/// Concurrency gate whose limit adapts to downstream feedback.
///
/// Callers report each completed call as either a success or a drop;
/// the limiter needs that feedback to steer, so every admitted call must be
/// matched by exactly one [`on_success`][Self::on_success] or
/// [`on_dropped`][Self::on_dropped]. Share one instance per protected
/// dependency.
#[derive(Debug)]
pub struct AimdLimiter {
    min: f64,
    max: f64,
    increase: f64,
    decrease_factor: f64,
    state: Mutex<AimdState>,
}

impl AimdLimiter {
    /// Creates a limiter starting at `initial`, adapting within `[min, max]`.
    ///
    /// Bounds are normalized so that `1 <= min <= initial <= max`.
    #[must_use]
    pub fn new(initial: u32, min: u32, max: u32) -> Self {
        let min = f64::from(min.max(1));
        let max = f64::from(max).max(min);
        let initial = f64::from(initial).clamp(min, max);
        Self {
            min,
            max,
            increase: DEFAULT_INCREASE,
            decrease_factor: DEFAULT_DECREASE_FACTOR,
            state: Mutex::new(AimdState {
                limit: initial,
                in_flight: 0,
            }),
        }
    }

    /// Overrides the multiplicative-decrease factor (clamped to `(0, 1]`).
    #[must_use]
    pub fn decrease_factor(mut self, factor: f64) -> Self {
        self.decrease_factor = factor.clamp(f64::MIN_POSITIVE, 1.0);
        self
    }

    /// Admits iff the in-flight count is below the current limit.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if f64::from(state.in_flight) < state.limit.floor() {
            state.in_flight += 1;
            true
        } else {
            false
        }
    }

    /// Records a successful call: releases its slot and grows the limit.
    ///
    /// Growth is `increase / limit` per success, so the limit climbs by about
    /// one slot per full round of concurrent successes.
    pub fn on_success(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.limit = (state.limit + self.increase / state.limit).min(self.max);
    }

    /// Records a dropped call: releases its slot and shrinks the limit.
    pub fn on_dropped(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.limit = (state.limit * self.decrease_factor).max(self.min);
    }

    /// The current adaptive limit, rounded down to whole slots.
    #[must_use]
    pub fn current_limit(&self) -> u32 {
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "Acceptable")]
        {
            self.state.lock().limit.floor() as u32
        }
    }

    /// Calls currently admitted and not yet reported back.
    #[must_use]
    pub fn in_flight(&self) -> u32 {
        self.state.lock().in_flight
    }
}

/// Reports `on_dropped` unless the call completed and said otherwise.
struct Slot<'a> {
    limiter: &'a AimdLimiter,
    reported: bool,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.limiter.on_dropped();
        }
    }
}

/// Runs `op` behind `limiter`.
///
/// When the limiter refuses admission the work is not invoked and the call
/// fails with [`Rejection::ConcurrencyLimited`]. A successful call is
/// reported as [`AimdLimiter::on_success`]; a failed or cancelled call as
/// [`AimdLimiter::on_dropped`].
///
/// # Errors
///
/// [`Rejection::ConcurrencyLimited`] (through `E`) on denial, or the work's
/// own error.
pub async fn with_concurrency_limit<T, E, F, Fut>(limiter: &AimdLimiter, op: F) -> Result<T, E>
where
    E: From<Rejection>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !limiter.try_acquire() {
        tracing::debug!(limit = limiter.current_limit(), "call denied, concurrency limit reached");
        return Err(Rejection::ConcurrencyLimited.into());
    }

    let mut slot = Slot {
        limiter,
        reported: false,
    };

    let result = op().await;
    slot.reported = true;
    match &result {
        Ok(_) => limiter.on_success(),
        Err(_) => limiter.on_dropped(),
    }
    result
}
