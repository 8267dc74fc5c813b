// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

use std::fmt::Display;

use tokio::time::Instant;

/// A single attempt within a retry run.
///
/// Attempts are numbered starting at 1. The value also carries the configured
/// attempt ceiling and the instant the run started, so retry policies can make
/// budget and time-window decisions without extra plumbing.
///
/// # Examples
///
/// ```
/// use ripcord::{Attempt, MaxAttempts};
///
/// let first = Attempt::first(MaxAttempts::Finite(3));
/// assert_eq!(first.number(), 1);
/// assert!(first.is_first());
/// assert!(!first.is_last());
/// assert!(first.has_remaining());
///
/// let last = first.next().next();
/// assert_eq!(last.number(), 3);
/// assert!(last.is_last());
/// assert!(!last.has_remaining());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    number: u32,
    max: MaxAttempts,
    started: Instant,
}

impl Attempt {
    /// Creates the first attempt of a run starting now.
    #[must_use]
    pub fn first(max: MaxAttempts) -> Self {
        Self::new(1, max, Instant::now())
    }

    pub(crate) fn new(number: u32, max: MaxAttempts, started: Instant) -> Self {
        debug_assert!(number >= 1, "attempts are 1-based");
        Self { number, max, started }
    }

    /// The 1-based attempt number.
    #[must_use]
    pub fn number(self) -> u32 {
        self.number
    }

    /// The configured attempt ceiling for the run.
    #[must_use]
    pub fn max_attempts(self) -> MaxAttempts {
        self.max
    }

    /// The instant the retry run started, before the first attempt.
    #[must_use]
    pub fn started(self) -> Instant {
        self.started
    }

    /// Returns `true` if this is the first attempt.
    #[must_use]
    pub fn is_first(self) -> bool {
        self.number == 1
    }

    /// Returns `true` if this is the final allowed attempt.
    #[must_use]
    pub fn is_last(self) -> bool {
        match self.max {
            MaxAttempts::Finite(max) => self.number >= max,
            MaxAttempts::Infinite => false,
        }
    }

    /// Returns `true` if at least one more attempt would be allowed after this one.
    ///
    /// Every built-in retry policy checks this before voting to retry, so no
    /// policy can schedule an attempt beyond the configured ceiling.
    #[must_use]
    pub fn has_remaining(self) -> bool {
        !self.is_last()
    }

    /// The attempt following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self {
            number: self.number.saturating_add(1),
            max: self.max,
            started: self.started,
        }
    }
}

impl Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.number.fmt(f)
    }
}

/// The maximum number of attempts (initial call plus retries) for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAttempts {
    /// At most this many attempts in total. A value of 1 disables retries.
    Finite(u32),

    /// No ceiling; termination is left to the retry policy and stop strategy.
    Infinite,
}

impl From<u32> for MaxAttempts {
    fn from(value: u32) -> Self {
        Self::Finite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_of_single_shot_is_last() {
        let a = Attempt::first(MaxAttempts::Finite(1));
        assert!(a.is_first());
        assert!(a.is_last());
        assert!(!a.has_remaining());
    }

    #[test]
    fn next_preserves_ceiling_and_start() {
        let a = Attempt::first(MaxAttempts::Finite(3));
        let b = a.next();
        assert_eq!(b.number(), 2);
        assert_eq!(b.max_attempts(), MaxAttempts::Finite(3));
        assert_eq!(b.started(), a.started());
    }

    #[test]
    fn infinite_never_reports_last() {
        let mut a = Attempt::first(MaxAttempts::Infinite);
        for _ in 0..100 {
            assert!(!a.is_last());
            a = a.next();
        }
    }

    #[test]
    fn number_saturates_instead_of_overflowing() {
        let a = Attempt::new(u32::MAX, MaxAttempts::Infinite, Instant::now());
        assert_eq!(a.next().number(), u32::MAX);
    }

    #[test]
    fn display_shows_number() {
        let a = Attempt::first(MaxAttempts::Finite(5));
        assert_eq!(format!("{a}"), "1");
    }
}
