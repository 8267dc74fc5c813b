// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Integration tests for the retry executor using only public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use ripcord::backoff::{BackoffRouter, Exponential, Fixed};
use ripcord::policy::{self, retry_if_inner, retry_on_failure, retry_on_timeout, with_budget};
use ripcord::stop::MaxElapsed;
use ripcord::{AttemptError, RetryBudget, RetryContext, RetryExecutor, RetryListener};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ApiError {
    Transient,
    InvalidRequest,
}

#[tokio::test(start_paused = true)]
async fn always_failing_work_is_invoked_exactly_max_attempts_times() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("always_fails")
        .max_attempts(3)
        .backoff(Fixed::new(Duration::from_millis(10)))
        .policy(retry_if_inner(|e: &ApiError| *e == ApiError::Transient))
        .build();

    let err = executor
        .run(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<u32, _>(ApiError::Transient))
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.attempts, 3);
    assert_eq!(err.into_last_inner(), Some(ApiError::Transient));
}

#[tokio::test(start_paused = true)]
async fn permanent_error_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("permanent")
        .max_attempts(5)
        .policy(retry_if_inner(|e: &ApiError| *e == ApiError::Transient))
        .build();

    let err = executor
        .run(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<u32, _>(ApiError::InvalidRequest))
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_sleeps_between_attempts() {
    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("backoff")
        .max_attempts(4)
        .backoff(Exponential::new(Duration::from_millis(100)))
        .policy(retry_on_failure())
        .build();

    let start = Instant::now();
    let _ = executor.run(|| std::future::ready(Err::<u32, _>(ApiError::Transient))).await;

    // 100ms + 200ms + 400ms between the four attempts.
    assert_eq!(start.elapsed(), Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn attempt_timeout_surfaces_as_timeout_error() {
    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("slow")
        .max_attempts(3)
        .attempt_timeout(Duration::from_millis(200))
        .backoff(Fixed::new(Duration::from_millis(10)))
        .policy(retry_on_timeout())
        .build();

    let err = executor
        .run(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 3);
    assert!(err.last_error.as_ref().is_some_and(AttemptError::is_timeout));
}

#[tokio::test(start_paused = true)]
async fn timeouts_and_inner_errors_can_route_to_different_backoffs() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("routed")
        .max_attempts(3)
        .backoff(Fixed::new(Duration::from_millis(10)))
        .backoff_router(
            BackoffRouter::new().route(AttemptError::is_timeout, Fixed::new(Duration::from_secs(10))),
        )
        .attempt_timeout(Duration::from_millis(100))
        .policy(retry_on_timeout())
        .build();

    let start = Instant::now();
    let _ = executor
        .run(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // The delay for an attempt is computed from the previous attempt's error,
    // so the first sleep uses the 10ms default and the second routes to 10s.
    assert_eq!(
        start.elapsed(),
        Duration::from_millis(100) * 3 + Duration::from_millis(10) + Duration::from_secs(10)
    );
}

#[tokio::test(start_paused = true)]
async fn stop_strategy_wins_over_willing_policy() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("stopped")
        .infinite_attempts()
        .backoff(Fixed::new(Duration::from_secs(10)))
        .stop(MaxElapsed::new(Duration::from_secs(25)))
        .policy(retry_on_failure())
        .build();

    let err = executor
        .run(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<u32, _>(ApiError::Transient))
        })
        .await
        .unwrap_err();

    // Attempts at t=0, 10s, 20s; the t=30s attempt is stopped first.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn fallback_value_is_returned_after_exhaustion() {
    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("fallback")
        .max_attempts(2)
        .backoff(Fixed::new(Duration::from_millis(1)))
        .policy(retry_on_failure())
        .fallback(|_| 0)
        .build();

    let value = executor
        .run(|| std::future::ready(Err::<u32, _>(ApiError::Transient)))
        .await
        .unwrap();

    assert_eq!(value, 0);
}

#[tokio::test(start_paused = true)]
async fn shared_budget_caps_retries_across_runs() {
    let budget = Arc::new(RetryBudget::new(3, 0.0));
    let calls = Arc::new(AtomicU32::new(0));

    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("budgeted")
        .max_attempts(10)
        .backoff(Fixed::new(Duration::from_millis(1)))
        .policy(with_budget(retry_on_failure(), Arc::clone(&budget)))
        .build();

    for _ in 0..2 {
        let calls_clone = Arc::clone(&calls);
        let _ = executor
            .run(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<u32, _>(ApiError::Transient))
            })
            .await;
    }

    // 3 retry tokens total: the first run uses them all (4 invocations), the
    // second run gets none (1 invocation).
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn composite_policy_retries_when_any_leaf_matches() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let transient = retry_if_inner(|e: &ApiError| *e == ApiError::Transient);
    let timeouts = retry_on_timeout();
    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("composite")
        .max_attempts(3)
        .backoff(Fixed::new(Duration::from_millis(1)))
        .policy(policy::any(vec![Arc::new(transient), Arc::new(timeouts)]))
        .build();

    let _ = executor
        .run(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<u32, _>(ApiError::Transient))
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl RetryListener<u32, ApiError> for Arc<EventLog> {
    fn on_attempt(&self, ctx: &RetryContext) {
        self.events.lock().push(format!("attempt:{}", ctx.attempt().number()));
    }

    fn before_sleep(&self, _ctx: &RetryContext, delay: Duration) -> Option<Duration> {
        self.events.lock().push(format!("sleep:{}ms", delay.as_millis()));
        None
    }

    fn on_failure(&self, _ctx: &RetryContext, _error: &AttemptError<ApiError>) {
        self.events.lock().push("failure".to_string());
    }

    fn on_finally(&self, _ctx: &RetryContext) {
        self.events.lock().push("finally".to_string());
    }
}

#[tokio::test(start_paused = true)]
async fn listener_sees_every_attempt_and_one_finally() {
    let log = Arc::new(EventLog::default());

    let executor: RetryExecutor<u32, ApiError> = RetryExecutor::builder("observed")
        .max_attempts(3)
        .backoff(Fixed::new(Duration::from_millis(20)))
        .policy(retry_on_failure())
        .listener(Arc::clone(&log))
        .build();

    let _ = executor.run(|| std::future::ready(Err::<u32, _>(ApiError::Transient))).await;

    let events = log.events.lock().clone();
    assert_eq!(
        events,
        vec![
            "attempt:1",
            "sleep:20ms",
            "attempt:2",
            "sleep:20ms",
            "attempt:3",
            "failure",
            "finally",
        ]
    );
}
