// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Lifecycle hooks fired by the retry executor.
//!
//! Hooks are the observability seam: metrics, event buses and tracing layers
//! subscribe here rather than being wired into the engine. Dispatch is
//! best-effort and funneled through a single guarded call, so a panicking
//! listener can never alter a run's outcome or ordering.
//!
//! Firing order per attempt is fixed: [`Lifecycle::before_attempt`], then
//! [`RetryListener::on_attempt`], then the attempt itself, then
//! `after_attempt_success`/`after_attempt_failure`, then the policy decision.
//! Terminal hooks (`on_success`/`on_failure`, the lifecycle counterparts) fire
//! once, and [`RetryListener::on_finally`] fires exactly once, last, on every
//! exit path.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use crate::context::RetryContext;
use crate::error::AttemptError;

/// Observer of a retry run's per-attempt and terminal events.
///
/// All methods default to no-ops; implement only what you need.
#[expect(unused_variables, reason = "default no-op implementations keep the argument names documented")]
pub trait RetryListener<T, E>: Send + Sync {
    /// Fired before each attempt is invoked.
    fn on_attempt(&self, ctx: &RetryContext) {}

    /// Fired after an attempt produced a value, before the policy is consulted.
    fn after_attempt_success(&self, ctx: &RetryContext, value: &T) {}

    /// Fired after an attempt failed, before the policy is consulted.
    fn after_attempt_failure(&self, ctx: &RetryContext, error: &AttemptError<E>) {}

    /// Fired before sleeping between attempts; may substitute the delay.
    ///
    /// Returning `Some` replaces the delay for this sleep. When several
    /// listeners adjust it, each sees the previous listener's adjustment.
    fn before_sleep(&self, ctx: &RetryContext, delay: Duration) -> Option<Duration> {
        None
    }

    /// Fired once when the run finishes with a value.
    fn on_success(&self, ctx: &RetryContext, value: &T) {}

    /// Fired once when the run gives up, before any fallback is applied.
    fn on_failure(&self, ctx: &RetryContext, error: &AttemptError<E>) {}

    /// Fired exactly once per run, on every exit path, after all other hooks.
    fn on_finally(&self, ctx: &RetryContext) {}
}

/// Minimal lifecycle SPI for collaborators that only track run boundaries.
#[expect(unused_variables, reason = "default no-op implementations keep the argument names documented")]
pub trait Lifecycle: Send + Sync {
    /// Fired before each attempt, ahead of [`RetryListener::on_attempt`].
    fn before_attempt(&self, ctx: &RetryContext) {}

    /// Fired once when the run finishes with a value.
    fn after_success(&self, ctx: &RetryContext) {}

    /// Fired once when the run gives up.
    fn after_failure(&self, ctx: &RetryContext) {}
}

/// Runs a hook, discarding any panic it raises.
///
/// This is the single enforcement point of the "hooks never propagate"
/// contract; every hook invocation in the executor goes through here.
pub(crate) fn guarded<F: FnOnce()>(hook: &'static str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::debug!(hook, "listener panicked; ignoring");
    }
}

/// Runs a value-returning hook, mapping a panic to `None`.
pub(crate) fn guarded_value<R, F: FnOnce() -> Option<R>>(hook: &'static str, f: F) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!(hook, "listener panicked; ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_swallows_panics() {
        guarded("test", || panic!("listener bug"));
    }

    #[test]
    fn guarded_value_swallows_panics() {
        let adjusted = guarded_value::<Duration, _>("test", || panic!("listener bug"));
        assert!(adjusted.is_none());

        let adjusted = guarded_value("test", || Some(Duration::from_secs(1)));
        assert_eq!(adjusted, Some(Duration::from_secs(1)));
    }
}
