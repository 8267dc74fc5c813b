// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use crate::attempt::Attempt;
use crate::error::RetryError;

/// Immutable snapshot describing one attempt, handed to every hook.
///
/// A fresh context is built for each attempt and never mutated afterwards, so
/// listeners may hold on to clones without observing later state.
#[derive(Debug, Clone)]
pub struct RetryContext {
    id: u64,
    name: Arc<str>,
    attempt: Attempt,
    next_delay: Duration,
    tags: Arc<[(String, String)]>,
}

impl RetryContext {
    pub(crate) fn new(id: u64, name: Arc<str>, attempt: Attempt, next_delay: Duration, tags: Arc<[(String, String)]>) -> Self {
        Self {
            id,
            name,
            attempt,
            next_delay,
            tags,
        }
    }

    /// Random identifier shared by all attempts of one run.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The executor's configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attempt this snapshot describes.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// The backoff delay computed for this attempt.
    ///
    /// This is the delay that will be slept *after* this attempt if the
    /// policy votes to retry; listeners may adjust it through
    /// [`before_sleep`][crate::hooks::RetryListener::before_sleep].
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Caller-supplied key/value tags configured on the executor.
    #[must_use]
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }
}

/// Terminal value of one executor run.
///
/// Unlike [`RetryExecutor::run`][crate::executor::RetryExecutor::run], the
/// outcome form never fails; inspect it or convert back with
/// [`into_result`][RetryOutcome::into_result].
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    attempts_used: u32,
    result: Result<T, RetryError<E>>,
}

impl<T, E> RetryOutcome<T, E> {
    pub(crate) fn new(attempts_used: u32, result: Result<T, RetryError<E>>) -> Self {
        Self { attempts_used, result }
    }

    /// How many times the unit of work was invoked.
    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Returns `true` if the run produced a value (directly or via fallback).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The produced value, if the run succeeded.
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// The terminal error, if the run failed.
    pub fn error(&self) -> Option<&RetryError<E>> {
        self.result.as_ref().err()
    }

    /// Consumes the outcome, yielding the underlying result.
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        self.result
    }
}
