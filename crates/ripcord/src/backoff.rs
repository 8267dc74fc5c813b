// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Delay strategies applied between retry attempts.
//!
//! A [`Backoff`] maps a 1-based attempt number to the delay slept before the
//! *next* attempt. Strategies are composable: jitter and clamping are
//! decorators over an inner strategy, so `Clamp(FullJitter(Exponential))`
//! reads the way it behaves.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::AttemptError;

/// Uniform samples in `[0, 1)` feeding the jitter decorators.
///
/// Jitter needs speed, not cryptographic strength, so the production source
/// samples `fastrand`. Tests swap in a fixed value or a scripted sequence to
/// make delays deterministic.
#[derive(Clone)]
struct JitterSource(Arc<dyn Fn() -> f64 + Send + Sync>);

impl Default for JitterSource {
    fn default() -> Self {
        Self(Arc::new(fastrand::f64))
    }
}

impl Debug for JitterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JitterSource")
    }
}

impl JitterSource {
    fn sample(&self) -> f64 {
        (self.0)()
    }

    #[cfg(test)]
    fn fixed(value: f64) -> Self {
        Self(Arc::new(move || value))
    }

    #[cfg(test)]
    fn scripted(values: Vec<f64>) -> Self {
        let values = Mutex::new(values.into_iter());
        Self(Arc::new(move || values.lock().next().unwrap_or(0.5)))
    }
}

/// A delay-for-attempt strategy.
///
/// `attempt` is the 1-based number of the attempt that just ran; the returned
/// duration is slept before the following attempt.
pub trait Backoff: Send + Sync + Debug {
    /// Computes the delay to apply after the given attempt.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Constant delay between attempts.
#[derive(Debug, Clone)]
pub struct Fixed {
    delay: Duration,
}

impl Fixed {
    /// Creates a fixed backoff with the given delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for Fixed {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Delay growing proportionally with the attempt number.
///
/// With a 100ms initial delay the sequence is `100ms, 200ms, 300ms, ...`.
#[derive(Debug, Clone)]
pub struct Linear {
    initial: Duration,
}

impl Linear {
    /// Creates a linear backoff starting at `initial`.
    #[must_use]
    pub fn new(initial: Duration) -> Self {
        Self { initial }
    }
}

impl Backoff for Linear {
    fn delay(&self, attempt: u32) -> Duration {
        self.initial.saturating_mul(attempt.max(1))
    }
}

/// Exponentially growing delay: `initial × multiplier^(attempt − 1)`.
///
/// The computation saturates at [`Duration::MAX`] instead of overflowing.
#[derive(Debug, Clone)]
pub struct Exponential {
    initial: Duration,
    multiplier: f64,
}

impl Exponential {
    /// Creates an exponential backoff with the conventional multiplier of 2.
    #[must_use]
    pub fn new(initial: Duration) -> Self {
        Self::with_multiplier(initial, 2.0)
    }

    /// Creates an exponential backoff with a custom multiplier.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is not finite or is less than 1.
    #[must_use]
    pub fn with_multiplier(initial: Duration, multiplier: f64) -> Self {
        assert!(multiplier.is_finite() && multiplier >= 1.0, "multiplier must be >= 1");
        Self { initial, multiplier }
    }
}

impl Backoff for Exponential {
    fn delay(&self, attempt: u32) -> Duration {
        // A zero base never grows; skip the float math, whose factor can
        // overflow to infinity and turn 0 x inf into NaN.
        if self.initial.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.max(1) - 1).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        secs_to_duration_saturating(self.initial.as_secs_f64() * factor)
    }
}

/// Full jitter: a uniformly random delay in `[0, inner]`.
#[derive(Debug)]
pub struct FullJitter {
    inner: Arc<dyn Backoff>,
    jitter: JitterSource,
}

impl FullJitter {
    /// Wraps `inner`, randomizing each delay over `[0, inner.delay(attempt)]`.
    #[must_use]
    pub fn new(inner: impl Backoff + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            jitter: JitterSource::default(),
        }
    }

    #[cfg(test)]
    fn with_jitter(inner: impl Backoff + 'static, jitter: JitterSource) -> Self {
        Self {
            inner: Arc::new(inner),
            jitter,
        }
    }
}

impl Backoff for FullJitter {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.inner.delay(attempt);
        secs_to_duration_saturating(base.as_secs_f64() * self.jitter.sample())
    }
}

/// Equal jitter: half the base delay plus a random half.
///
/// Keeps a floor of `inner / 2` while still spreading callers, landing each
/// delay in `[inner/2, inner]`.
#[derive(Debug)]
pub struct EqualJitter {
    inner: Arc<dyn Backoff>,
    jitter: JitterSource,
}

impl EqualJitter {
    /// Wraps `inner`, randomizing each delay over `[inner/2, inner]`.
    #[must_use]
    pub fn new(inner: impl Backoff + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            jitter: JitterSource::default(),
        }
    }

    #[cfg(test)]
    fn with_jitter(inner: impl Backoff + 'static, jitter: JitterSource) -> Self {
        Self {
            inner: Arc::new(inner),
            jitter,
        }
    }
}

impl Backoff for EqualJitter {
    fn delay(&self, attempt: u32) -> Duration {
        let secs = self.inner.delay(attempt).as_secs_f64();
        let half = secs / 2.0;
        secs_to_duration_saturating(half + half * self.jitter.sample())
    }
}

/// De-correlated jitter with smooth exponential growth.
///
/// Each step samples a random phase `t = (attempt − 1) + U[0,1)` and advances a
/// smooth `2^t · tanh(√(4t))` curve, taking only the delta from the previous
/// position. This weakens the correlation between consecutive delays and
/// avoids the synchronized retry spikes that naive jitter can produce.
///
/// The strategy is stateful and expects to be consulted with increasing
/// attempt numbers within one run; sharing a single instance across runs
/// blends their sequences, which is harmless but less precise.
#[derive(Debug)]
pub struct DecorrelatedJitter {
    base: Duration,
    prev: Mutex<f64>,
    jitter: JitterSource,
}

/// Smoothing factor applied inside the de-correlated jitter curve.
const DECORRELATED_P_FACTOR: f64 = 4.0;

/// Scales the median delays to land near whole multiples of the base delay.
const DECORRELATED_SCALING: f64 = 1.0 / 1.4;

impl DecorrelatedJitter {
    /// Creates a de-correlated jitter backoff whose first delay has a median
    /// close to `base`.
    #[must_use]
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            prev: Mutex::new(0.0),
            jitter: JitterSource::default(),
        }
    }

    #[cfg(test)]
    fn with_jitter(base: Duration, jitter: JitterSource) -> Self {
        Self {
            base,
            prev: Mutex::new(0.0),
            jitter,
        }
    }
}

impl Backoff for DecorrelatedJitter {
    fn delay(&self, attempt: u32) -> Duration {
        let t = f64::from(attempt.max(1) - 1) + self.jitter.sample();
        let next = t.exp2() * (DECORRELATED_P_FACTOR * t).sqrt().tanh();

        let mut prev = self.prev.lock();
        if !next.is_finite() {
            *prev = next;
            return Duration::MAX;
        }

        let step = next - *prev;
        *prev = next;

        secs_to_duration_saturating(step * DECORRELATED_SCALING * self.base.as_secs_f64())
    }
}

/// Clamps an inner strategy's delays to `[floor, ceil]`.
#[derive(Debug)]
pub struct Clamp {
    inner: Arc<dyn Backoff>,
    floor: Duration,
    ceil: Duration,
}

impl Clamp {
    /// Wraps `inner`, clamping every delay into `[floor, ceil]`.
    ///
    /// # Panics
    ///
    /// Panics if `floor > ceil`.
    #[must_use]
    pub fn new(inner: impl Backoff + 'static, floor: Duration, ceil: Duration) -> Self {
        assert!(floor <= ceil, "floor must not exceed ceil");
        Self {
            inner: Arc::new(inner),
            floor,
            ceil,
        }
    }
}

impl Backoff for Clamp {
    fn delay(&self, attempt: u32) -> Duration {
        self.inner.delay(attempt).clamp(self.floor, self.ceil)
    }
}

/// Stateful decorator that tracks its own iteration count.
///
/// Each call to [`delay`][Backoff::delay] advances an internal counter and
/// ignores the attempt number passed in, so one instance can pace work that is
/// not driven by a retry executor (for example a reconnect loop). The counter
/// holds its position until [`reset`][Resettable::reset] is called.
#[derive(Debug)]
pub struct Resettable {
    inner: Arc<dyn Backoff>,
    iterations: AtomicU32,
}

impl Resettable {
    /// Wraps `inner` with an internal iteration counter.
    #[must_use]
    pub fn new(inner: impl Backoff + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            iterations: AtomicU32::new(0),
        }
    }

    /// Restarts the internal sequence from the first iteration.
    pub fn reset(&self) {
        self.iterations.store(0, Ordering::Relaxed);
    }
}

impl Backoff for Resettable {
    fn delay(&self, _attempt: u32) -> Duration {
        let n = self.iterations.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        self.inner.delay(n)
    }
}

/// Symmetric jitter of ± `fraction` around the inner delay.
#[derive(Debug)]
pub struct Jittered {
    inner: Arc<dyn Backoff>,
    fraction: f64,
    jitter: JitterSource,
}

impl Jittered {
    /// Wraps `inner`, spreading each delay uniformly over
    /// `[(1 − fraction) · d, (1 + fraction) · d]`.
    ///
    /// # Panics
    ///
    /// Panics if `fraction` is outside `[0, 1]`.
    #[must_use]
    pub fn new(inner: impl Backoff + 'static, fraction: f64) -> Self {
        assert!((0.0..=1.0).contains(&fraction), "fraction must be within [0, 1]");
        Self {
            inner: Arc::new(inner),
            fraction,
            jitter: JitterSource::default(),
        }
    }

    #[cfg(test)]
    fn with_jitter(inner: impl Backoff + 'static, fraction: f64, jitter: JitterSource) -> Self {
        Self {
            inner: Arc::new(inner),
            fraction,
            jitter,
        }
    }
}

impl Backoff for Jittered {
    fn delay(&self, attempt: u32) -> Duration {
        let secs = self.inner.delay(attempt).as_secs_f64();
        let offset = self.fraction.mul_add(2.0 * self.jitter.sample() - 1.0, 1.0);
        secs_to_duration_saturating(secs * offset)
    }
}

/// Routes failed attempts to error-specific backoff strategies.
///
/// Routes are consulted in registration order; the first predicate matching
/// the last attempt's error selects the strategy. When no route matches (or
/// the last attempt succeeded), the executor falls back to its default
/// strategy.
pub struct BackoffRouter<E> {
    #[expect(clippy::type_complexity, reason = "predicate alias would obscure the single use site")]
    routes: Vec<(Box<dyn Fn(&AttemptError<E>) -> bool + Send + Sync>, Arc<dyn Backoff>)>,
}

impl<E> Default for BackoffRouter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> BackoffRouter<E> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Adds a route: errors matching `predicate` use `backoff`.
    #[must_use]
    pub fn route<P>(mut self, predicate: P, backoff: impl Backoff + 'static) -> Self
    where
        P: Fn(&AttemptError<E>) -> bool + Send + Sync + 'static,
    {
        self.routes.push((Box::new(predicate), Arc::new(backoff)));
        self
    }

    /// Returns the delay of the first matching route, if any.
    pub(crate) fn delay_for(&self, error: &AttemptError<E>, attempt: u32) -> Option<Duration> {
        self.routes
            .iter()
            .find(|(predicate, _)| predicate(error))
            .map(|(_, backoff)| backoff.delay(attempt))
    }
}

impl<E> Debug for BackoffRouter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffRouter").field("routes", &self.routes.len()).finish()
    }
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
