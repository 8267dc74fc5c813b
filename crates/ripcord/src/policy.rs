// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Should-retry decisions.
//!
//! A [`Policy`] inspects the outcome of one attempt and votes on whether the
//! executor should try again. Policies are pure predicates from the
//! executor's point of view; a few built-ins keep private bookkeeping (the
//! sliding window and the consecutive-error counter) behind a lock.
//!
//! Every built-in leaf refuses to retry once the attempt ceiling is reached,
//! so combinators never have to re-check it. Leaves compose with [`any`]
//! (logical OR, first `true` wins), [`all`] and [`not`], and a policy can be
//! capped by a shared [`RetryBudget`] via [`with_budget`].

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::attempt::Attempt;
use crate::bucket::RetryBudget;
use crate::error::AttemptError;

/// A should-retry decision over the outcome of one attempt.
pub trait Policy<T, E>: Send + Sync {
    /// Returns `true` if the executor should run another attempt.
    ///
    /// `outcome` borrows the attempt's value or failure; `attempt` is the
    /// attempt that just completed.
    fn should_retry(&self, outcome: Result<&T, &AttemptError<E>>, attempt: Attempt) -> bool;
}

/// Classification of an attempt outcome by a [`classify`] policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The outcome is transient; run another attempt.
    Retry,
    /// The outcome is acceptable; finish the run with it.
    Success,
    /// The outcome is permanent; fail without further attempts.
    Fail,
}

/// Retries when a failed attempt's error matches `predicate`.
///
/// The predicate sees the full [`AttemptError`], including per-attempt
/// timeouts. Successful attempts never match.
pub fn retry_if<T, E, P>(predicate: P) -> impl Policy<T, E>
where
    P: Fn(&AttemptError<E>) -> bool + Send + Sync,
{
    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        attempt.has_remaining() && outcome.err().is_some_and(|e| predicate(e))
    })
}

/// Retries when the unit of work's own error matches `predicate`.
///
/// Timeouts never match; combine with [`retry_on_timeout`] via [`any`] to
/// cover both.
pub fn retry_if_inner<T, E, P>(predicate: P) -> impl Policy<T, E>
where
    P: Fn(&E) -> bool + Send + Sync,
{
    retry_if(move |error: &AttemptError<E>| error.inner().is_some_and(&predicate))
}

/// Retries on any failure, including timeouts.
pub fn retry_on_failure<T, E>() -> impl Policy<T, E> {
    retry_if(|_| true)
}

/// Retries when an attempt failed because its per-attempt timeout expired.
pub fn retry_on_timeout<T, E>() -> impl Policy<T, E> {
    retry_if(AttemptError::is_timeout)
}

/// Retries when a *successful* attempt produced an unacceptable value.
///
/// Lets callers treat application-level responses (a `retry-later` status, an
/// empty page) as transient without turning them into errors.
pub fn retry_if_result<T, E, P>(predicate: P) -> impl Policy<T, E>
where
    P: Fn(&T) -> bool + Send + Sync,
{
    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        attempt.has_remaining() && outcome.ok().is_some_and(|v| predicate(v))
    })
}

/// Retries according to a three-way classification of the outcome.
pub fn classify<T, E, F>(classifier: F) -> impl Policy<T, E>
where
    F: Fn(Result<&T, &AttemptError<E>>) -> Verdict + Send + Sync,
{
    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        attempt.has_remaining() && classifier(outcome) == Verdict::Retry
    })
}

/// Retries failures only while the run is younger than `window`.
///
/// The window is measured from the start of the run, before the first
/// attempt.
pub fn within_time_window<T, E>(window: Duration) -> impl Policy<T, E> {
    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        attempt.has_remaining()
            && outcome.is_err()
            && Instant::now().saturating_duration_since(attempt.started()) < window
    })
}

/// Retries failures until `max_failures` of them have landed inside a rolling
/// `window`.
///
/// The counter is shared state: one instance observes every run it is
/// attached to, which makes it useful as a crude cross-run brake.
pub fn sliding_window<T, E>(max_failures: usize, window: Duration) -> impl Policy<T, E> {
    let failures: Mutex<VecDeque<Instant>> = Mutex::new(VecDeque::new());

    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        if !attempt.has_remaining() || outcome.is_ok() {
            return false;
        }

        let now = Instant::now();
        let mut failures = failures.lock();
        while failures.front().is_some_and(|&t| now.saturating_duration_since(t) >= window) {
            failures.pop_front();
        }
        failures.push_back(now);

        failures.len() <= max_failures
    })
}

/// Retries until the same error has occurred `max_consecutive` times in a row.
///
/// Errors are compared through `key`, typically a coarse classification such
/// as an error code. A different key, or a successful attempt, resets the
/// streak.
pub fn max_same_error<T, E, K>(max_consecutive: u32, key: K) -> impl Policy<T, E>
where
    K: Fn(&AttemptError<E>) -> String + Send + Sync,
{
    let streak: Mutex<Option<(String, u32)>> = Mutex::new(None);

    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        let mut streak = streak.lock();

        let Err(error) = outcome else {
            *streak = None;
            return false;
        };

        let current = key(error);
        let count = match streak.take() {
            Some((previous, count)) if previous == current => count.saturating_add(1),
            _ => 1,
        };
        *streak = Some((current, count));

        attempt.has_remaining() && count < max_consecutive
    })
}

/// Logical OR over `policies`: the first `true` vote wins.
pub fn any<T, E>(policies: Vec<Arc<dyn Policy<T, E>>>) -> impl Policy<T, E> {
    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        policies.iter().any(|p| p.should_retry(outcome, attempt))
    })
}

/// Logical AND over `policies`: every policy must vote to retry.
pub fn all<T, E>(policies: Vec<Arc<dyn Policy<T, E>>>) -> impl Policy<T, E> {
    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        !policies.is_empty() && policies.iter().all(|p| p.should_retry(outcome, attempt))
    })
}

/// Inverts a policy's vote.
///
/// Intended for policy authors composing exclusions (for example "retry on
/// anything except admission denials"); note the inversion does not re-check
/// the attempt ceiling, so wrap the result in [`all`] with a ceiling-aware
/// leaf when used standalone.
pub fn not<T, E>(policy: impl Policy<T, E> + 'static) -> impl Policy<T, E> {
    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| !policy.should_retry(outcome, attempt))
}

/// Caps a policy's retry volume with a shared [`RetryBudget`].
///
/// The base policy is consulted first; a budget token is drawn only when it
/// votes to retry, so refused retries never consume budget. Both must agree
/// for the attempt to happen.
pub fn with_budget<T, E>(policy: impl Policy<T, E> + 'static, budget: Arc<RetryBudget>) -> impl Policy<T, E> {
    FnPolicy(move |outcome: Result<&T, &AttemptError<E>>, attempt: Attempt| {
        policy.should_retry(outcome, attempt) && budget.try_acquire()
    })
}

/// Wraps a closure as a [`Policy`].
struct FnPolicy<F>(F);

impl<T, E, F> Policy<T, E> for FnPolicy<F>
where
    F: Fn(Result<&T, &AttemptError<E>>, Attempt) -> bool + Send + Sync,
{
    fn should_retry(&self, outcome: Result<&T, &AttemptError<E>>, attempt: Attempt) -> bool {
        (self.0)(outcome, attempt)
    }
}
