// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! The attempt-loop engine.
//!
//! [`RetryExecutor`] drives a unit of work through attempts: it asks the
//! backoff for the next delay, consults the stop strategy, invokes the work
//! (optionally bounded by a per-attempt timeout), routes the outcome through
//! the retry policy and fires lifecycle hooks at every transition.
//!
//! Configuration is two-phase: a [`RetryExecutorBuilder`] collects options and
//! freezes them into an immutable, `Arc`-shared config, so a running loop can
//! never observe a mutation.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use ripcord::backoff::Fixed;
//! use ripcord::policy::retry_on_failure;
//! use ripcord::RetryExecutor;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let executor: RetryExecutor<u32, String> = RetryExecutor::builder("lookup")
//!     .max_attempts(3)
//!     .backoff(Fixed::new(Duration::from_millis(50)))
//!     .policy(retry_on_failure())
//!     .build();
//!
//! let mut calls = 0;
//! let result = executor
//!     .run(|| {
//!         calls += 1;
//!         let attempt = calls;
//!         async move {
//!             if attempt < 3 {
//!                 Err("transient".to_string())
//!             } else {
//!                 Ok(attempt)
//!             }
//!         }
//!     })
//!     .await;
//!
//! assert_eq!(result.unwrap(), 3);
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::attempt::{Attempt, MaxAttempts};
use crate::backoff::{Backoff, BackoffRouter, Exponential};
use crate::context::{RetryContext, RetryOutcome};
use crate::error::{AttemptError, RetryError};
use crate::hooks::{Lifecycle, RetryListener, guarded, guarded_value};
use crate::policy::{Policy, retry_on_failure};
use crate::stop::{Never, StopStrategy};

/// Default attempt ceiling: one initial call plus two retries.
const DEFAULT_MAX_ATTEMPTS: MaxAttempts = MaxAttempts::Finite(3);

/// Default backoff base delay.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

type Fallback<T, E> = Box<dyn Fn(&AttemptError<E>) -> T + Send + Sync>;

/// Drives a unit of work through retry attempts.
///
/// The executor is cheap to clone (the configuration is `Arc`-shared) and
/// safe to use from many tasks concurrently; each run keeps its own loop
/// state.
pub struct RetryExecutor<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for RetryExecutor<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> std::fmt::Debug for RetryExecutor<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("name", &self.shared.name)
            .field("max_attempts", &self.shared.max_attempts)
            .finish_non_exhaustive()
    }
}

struct Shared<T, E> {
    name: Arc<str>,
    tags: Arc<[(String, String)]>,
    max_attempts: MaxAttempts,
    policy: Arc<dyn Policy<T, E>>,
    backoff: Arc<dyn Backoff>,
    router: Option<BackoffRouter<E>>,
    stop: Arc<dyn StopStrategy>,
    attempt_timeout: Option<Duration>,
    fallback: Option<Fallback<T, E>>,
    listeners: Vec<Arc<dyn RetryListener<T, E>>>,
    lifecycle: Vec<Arc<dyn Lifecycle>>,
}

impl<T: 'static, E: 'static> RetryExecutor<T, E> {
    /// Starts configuring an executor with the given name.
    ///
    /// The name appears in log events and in every [`RetryContext`]; use
    /// `snake_case` identifiers naming the protected dependency.
    pub fn builder(name: impl Into<Arc<str>>) -> RetryExecutorBuilder<T, E> {
        RetryExecutorBuilder::new(name.into())
    }

    /// Runs the unit of work, returning the value or a terminal [`RetryError`].
    pub async fn run<F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_outcome(op).await.into_result()
    }

    /// Runs the unit of work, always returning a [`RetryOutcome`].
    pub async fn run_outcome<F, Fut>(&self, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let shared = &self.shared;
        let run_id = fastrand::u64(..);
        let started = Instant::now();

        let mut attempt = Attempt::new(1, shared.max_attempts, started);
        let mut last_error: Option<AttemptError<E>> = None;
        let mut final_ctx: Option<RetryContext> = None;

        let outcome = loop {
            let next_delay = self.next_delay(last_error.as_ref(), attempt.number());
            let ctx = RetryContext::new(
                run_id,
                Arc::clone(&shared.name),
                attempt,
                next_delay,
                Arc::clone(&shared.tags),
            );

            if !attempt.is_first() && shared.stop.should_stop(attempt.number(), started, Instant::now(), next_delay) {
                tracing::warn!(
                    name = %shared.name,
                    attempt = attempt.number(),
                    "stop strategy ended the run"
                );
                let attempts_used = attempt.number() - 1;
                final_ctx = Some(ctx);
                break RetryOutcome::new(
                    attempts_used,
                    Err(RetryError {
                        attempts: attempts_used,
                        last_error: last_error.take(),
                    }),
                );
            }

            for hook in &shared.lifecycle {
                guarded("before_attempt", || hook.before_attempt(&ctx));
            }
            for hook in &shared.listeners {
                guarded("on_attempt", || hook.on_attempt(&ctx));
            }

            match self.invoke(&mut op).await {
                Ok(value) => {
                    for hook in &shared.listeners {
                        guarded("after_attempt_success", || hook.after_attempt_success(&ctx, &value));
                    }

                    // The ceiling is enforced here as well as in the built-in
                    // policies, so a custom policy cannot overrun it.
                    if attempt.has_remaining() && shared.policy.should_retry(Ok(&value), attempt) {
                        self.emit_retry_event(&ctx);
                        self.sleep(&ctx, next_delay).await;
                        attempt = attempt.next();
                        last_error = None;
                        final_ctx = Some(ctx);
                        continue;
                    }

                    for hook in &shared.listeners {
                        guarded("on_success", || hook.on_success(&ctx, &value));
                    }
                    for hook in &shared.lifecycle {
                        guarded("after_success", || hook.after_success(&ctx));
                    }

                    let attempts_used = attempt.number();
                    final_ctx = Some(ctx);
                    break RetryOutcome::new(attempts_used, Ok(value));
                }
                Err(error) => {
                    for hook in &shared.listeners {
                        guarded("after_attempt_failure", || hook.after_attempt_failure(&ctx, &error));
                    }

                    if attempt.has_remaining() && shared.policy.should_retry(Err(&error), attempt) {
                        self.emit_retry_event(&ctx);
                        self.sleep(&ctx, next_delay).await;
                        attempt = attempt.next();
                        last_error = Some(error);
                        final_ctx = Some(ctx);
                        continue;
                    }

                    for hook in &shared.listeners {
                        guarded("on_failure", || hook.on_failure(&ctx, &error));
                    }
                    for hook in &shared.lifecycle {
                        guarded("after_failure", || hook.after_failure(&ctx));
                    }

                    let attempts_used = attempt.number();
                    final_ctx = Some(ctx);

                    if let Some(fallback) = &shared.fallback {
                        break RetryOutcome::new(attempts_used, Ok(fallback(&error)));
                    }

                    break RetryOutcome::new(
                        attempts_used,
                        Err(RetryError {
                            attempts: attempts_used,
                            last_error: Some(error),
                        }),
                    );
                }
            }
        };

        if let Some(ctx) = final_ctx {
            for hook in &shared.listeners {
                guarded("on_finally", || hook.on_finally(&ctx));
            }
        }

        outcome
    }

    /// Runs the same loop as a task on the supplied runtime handle.
    pub fn spawn<F, Fut>(&self, handle: &tokio::runtime::Handle, op: F) -> tokio::task::JoinHandle<RetryOutcome<T, E>>
    where
        T: Send,
        E: Send,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let executor = self.clone();
        handle.spawn(async move { executor.run_outcome(op).await })
    }

    async fn invoke<F, Fut>(&self, op: &mut F) -> Result<T, AttemptError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.shared.attempt_timeout {
            // On expiry the attempt future is dropped; cancellation of the
            // underlying work is best-effort.
            Some(limit) => match tokio::time::timeout(limit, op()).await {
                Ok(result) => result.map_err(AttemptError::Inner),
                Err(_) => Err(AttemptError::TimedOut(limit)),
            },
            None => op().await.map_err(AttemptError::Inner),
        }
    }

    fn next_delay(&self, last_error: Option<&AttemptError<E>>, attempt: u32) -> Duration {
        if let (Some(error), Some(router)) = (last_error, &self.shared.router)
            && let Some(delay) = router.delay_for(error, attempt)
        {
            return delay;
        }

        self.shared.backoff.delay(attempt)
    }

    async fn sleep(&self, ctx: &RetryContext, delay: Duration) {
        let mut delay = delay;
        for hook in &self.shared.listeners {
            if let Some(adjusted) = guarded_value("before_sleep", || hook.before_sleep(ctx, delay)) {
                delay = adjusted;
            }
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn emit_retry_event(&self, ctx: &RetryContext) {
        #[expect(clippy::cast_possible_truncation, reason = "Acceptable")]
        tracing::warn!(
            name = %self.shared.name,
            run_id = ctx.id(),
            attempt = ctx.attempt().number(),
            is_last = ctx.attempt().is_last(),
            delay_ms = ctx.next_delay().as_millis() as u64,
            "attempt will be retried"
        );
    }
}

/// Mutable configuration phase of a [`RetryExecutor`].
///
/// Defaults: 3 attempts, exponential backoff from 100ms, retry on any
/// failure, no stop strategy, no per-attempt timeout, no fallback.
pub struct RetryExecutorBuilder<T, E> {
    name: Arc<str>,
    tags: Vec<(String, String)>,
    max_attempts: MaxAttempts,
    policy: Option<Arc<dyn Policy<T, E>>>,
    backoff: Option<Arc<dyn Backoff>>,
    router: Option<BackoffRouter<E>>,
    stop: Option<Arc<dyn StopStrategy>>,
    attempt_timeout: Option<Duration>,
    fallback: Option<Fallback<T, E>>,
    listeners: Vec<Arc<dyn RetryListener<T, E>>>,
    lifecycle: Vec<Arc<dyn Lifecycle>>,
}

impl<T, E> std::fmt::Debug for RetryExecutorBuilder<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutorBuilder")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl<T: 'static, E: 'static> RetryExecutorBuilder<T, E> {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            tags: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            policy: None,
            backoff: None,
            router: None,
            stop: None,
            attempt_timeout: None,
            fallback: None,
            listeners: Vec::new(),
            lifecycle: Vec::new(),
        }
    }

    /// Sets the total attempt ceiling (initial call plus retries).
    #[must_use]
    pub fn max_attempts(mut self, max: impl Into<MaxAttempts>) -> Self {
        self.max_attempts = max.into();
        self
    }

    /// Removes the attempt ceiling; termination is then driven entirely by
    /// the policy and stop strategy.
    #[must_use]
    pub fn infinite_attempts(mut self) -> Self {
        self.max_attempts = MaxAttempts::Infinite;
        self
    }

    /// Sets the retry policy. Defaults to retrying any failure.
    #[must_use]
    pub fn policy(mut self, policy: impl Policy<T, E> + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Sets the default backoff strategy.
    #[must_use]
    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Routes failed attempts to error-specific backoff strategies; errors
    /// with no matching route use the default backoff.
    #[must_use]
    pub fn backoff_router(mut self, router: BackoffRouter<E>) -> Self {
        self.router = Some(router);
        self
    }

    /// Sets a stop strategy consulted before every attempt after the first.
    #[must_use]
    pub fn stop(mut self, stop: impl StopStrategy + 'static) -> Self {
        self.stop = Some(Arc::new(stop));
        self
    }

    /// Bounds each attempt's execution time.
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Substitutes a value when the run would otherwise fail.
    ///
    /// The fallback observes the final attempt's error. A panicking fallback
    /// propagates to the caller; it is not treated as a hook.
    #[must_use]
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&AttemptError<E>) -> T + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Attaches a key/value tag surfaced through [`RetryContext::tags`].
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Registers a listener; listeners fire in registration order.
    #[must_use]
    pub fn listener(mut self, listener: impl RetryListener<T, E> + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Registers a lifecycle observer.
    #[must_use]
    pub fn lifecycle(mut self, lifecycle: impl Lifecycle + 'static) -> Self {
        self.lifecycle.push(Arc::new(lifecycle));
        self
    }

    /// Freezes the configuration into an executor.
    #[must_use]
    pub fn build(self) -> RetryExecutor<T, E> {
        RetryExecutor {
            shared: Arc::new(Shared {
                name: self.name,
                tags: self.tags.into(),
                max_attempts: self.max_attempts,
                policy: self.policy.unwrap_or_else(|| Arc::new(retry_on_failure())),
                backoff: self.backoff.unwrap_or_else(|| Arc::new(Exponential::new(DEFAULT_BASE_DELAY))),
                router: self.router,
                stop: self.stop.unwrap_or_else(|| Arc::new(Never)),
                attempt_timeout: self.attempt_timeout,
                fallback: self.fallback,
                listeners: self.listeners,
                lifecycle: self.lifecycle,
            }),
        }
    }
}
