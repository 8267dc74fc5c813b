// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Embeddable resilience toolkit for calls to unreliable dependencies.
//!
//! This crate wraps a caller-supplied unit of work in composable protection
//! layers: retries with pluggable backoff and stop strategies, circuit
//! breaking, bulkheads, adaptive concurrency limiting, token-bucket rate
//! limiting, retry budgets, request coalescing and result caching. There is
//! no global state; every control is an explicitly constructed instance
//! shared by the call sites protecting one logical dependency.
//!
//! # Core Types
//!
//! - [`RetryExecutor`]: drives a unit of work through retry attempts under an
//!   immutable, builder-assembled configuration.
//! - [`Policy`](policy::Policy), [`Backoff`](backoff::Backoff),
//!   [`StopStrategy`](stop::StopStrategy): the pluggable strategy seams of the
//!   attempt loop, each with a closed set of built-ins and open to caller
//!   implementations.
//! - [`CircuitBreaker`], [`Bulkhead`], [`AimdLimiter`], [`RateLimiter`]:
//!   admission controls, each paired with a decorator function that refuses
//!   with a distinguishable [`Rejection`] before the work runs.
//! - [`SingleFlight`]: coalesces concurrent identical calls into one
//!   execution per key.
//! - [`cached`](cache::cached): consults a [`ResultCache`](cache::ResultCache)
//!   before invoking the work.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use ripcord::backoff::{Clamp, DecorrelatedJitter};
//! use ripcord::policy::retry_if_inner;
//! use ripcord::RetryExecutor;
//!
//! #[derive(Debug)]
//! enum ApiError {
//!     Transient,
//!     InvalidRequest,
//! }
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let executor: RetryExecutor<String, ApiError> = RetryExecutor::builder("profile_fetch")
//!     .max_attempts(4)
//!     .backoff(Clamp::new(
//!         DecorrelatedJitter::new(Duration::from_millis(100)),
//!         Duration::ZERO,
//!         Duration::from_secs(5),
//!     ))
//!     .policy(retry_if_inner(|e: &ApiError| matches!(e, ApiError::Transient)))
//!     .attempt_timeout(Duration::from_secs(2))
//!     .build();
//!
//! let mut calls = 0;
//! let profile = executor
//!     .run(|| {
//!         calls += 1;
//!         let attempt = calls;
//!         async move {
//!             if attempt < 2 {
//!                 Err(ApiError::Transient)
//!             } else {
//!                 Ok("profile".to_string())
//!             }
//!         }
//!     })
//!     .await;
//!
//! assert_eq!(profile.unwrap(), "profile");
//! # }
//! ```
//!
//! # Composing Controls
//!
//! Decorators are plain async functions over the unit of work, so layering is
//! nesting: a retry loop around a circuit breaker around a bulkhead runs
//! admission checks innermost-first and retries whatever the inner layers
//! surface. Admission denials arrive through the caller's error type via
//! `E: From<Rejection>`, which keeps them distinguishable from business
//! errors so policies can decline to retry them.

pub mod backoff;
pub mod breaker;
pub mod bucket;
pub mod bulkhead;
pub mod cache;
pub mod flight;
pub mod hooks;
pub mod limiter;
pub mod policy;
pub mod stop;

mod attempt;
mod context;
mod error;
mod executor;

pub use attempt::{Attempt, MaxAttempts};
pub use breaker::{CircuitBreaker, ConsecutiveFailures, FailureAccrual, WindowedFailures, circuit_break};
pub use bucket::{RateLimiter, RetryBudget, TokenBucket, with_rate_limit};
pub use bulkhead::{Bulkhead, with_bulkhead};
pub use cache::{MemoryCache, ResultCache, cached};
pub use context::{RetryContext, RetryOutcome};
pub use error::{AttemptError, Rejection, RetryError};
pub use executor::{RetryExecutor, RetryExecutorBuilder};
pub use flight::SingleFlight;
pub use hooks::{Lifecycle, RetryListener};
pub use limiter::{AimdLimiter, with_concurrency_limit};
