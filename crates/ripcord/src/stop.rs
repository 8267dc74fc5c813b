// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Give-up strategies consulted before each retry attempt.
//!
//! A [`StopStrategy`] terminates a run regardless of what the retry policy
//! voted: the executor consults it at the top of every attempt after the
//! first, and a `true` verdict ends the run without invoking the unit of work
//! again. The attempt ceiling itself is enforced separately by the executor
//! and the policies; stop strategies cover time-based termination.

use std::fmt::Debug;
use std::time::Duration;

use tokio::time::Instant;

/// Decides whether a retry run should give up before its next attempt.
pub trait StopStrategy: Send + Sync + Debug {
    /// Returns `true` to terminate the run before attempt `attempt` executes.
    ///
    /// `started` is when the run began, `now` is the current instant and
    /// `next_delay` is the backoff delay that was computed for this attempt.
    fn should_stop(&self, attempt: u32, started: Instant, now: Instant, next_delay: Duration) -> bool;
}

/// Never stops; termination is left to the policy and the attempt ceiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl StopStrategy for Never {
    fn should_stop(&self, _attempt: u32, _started: Instant, _now: Instant, _next_delay: Duration) -> bool {
        false
    }
}

/// Stops once the run has been going for longer than a wall-clock budget.
#[derive(Debug, Clone, Copy)]
pub struct MaxElapsed {
    limit: Duration,
}

impl MaxElapsed {
    /// Stops retrying once `limit` has elapsed since the run started.
    #[must_use]
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl StopStrategy for MaxElapsed {
    fn should_stop(&self, _attempt: u32, started: Instant, now: Instant, _next_delay: Duration) -> bool {
        now.saturating_duration_since(started) >= self.limit
    }
}

/// Stops at a fixed point in time, independent of when the run started.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Stops retrying once `at` has passed.
    #[must_use]
    pub fn new(at: Instant) -> Self {
        Self { at }
    }
}

impl StopStrategy for Deadline {
    fn should_stop(&self, _attempt: u32, _started: Instant, now: Instant, _next_delay: Duration) -> bool {
        now >= self.at
    }
}

/// Stops when the backoff delay grows beyond a threshold.
///
/// Useful with unbounded exponential backoff: once the next wait would exceed
/// the threshold, the caller is better served by the terminal error.
#[derive(Debug, Clone, Copy)]
pub struct MaxDelay {
    threshold: Duration,
}

impl MaxDelay {
    /// Stops retrying once the computed next delay reaches `threshold`.
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

impl StopStrategy for MaxDelay {
    fn should_stop(&self, _attempt: u32, _started: Instant, _now: Instant, next_delay: Duration) -> bool {
        next_delay >= self.threshold
    }
}
