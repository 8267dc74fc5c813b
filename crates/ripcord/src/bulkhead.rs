// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Bounded-concurrency admission gate.
//!
//! A [`Bulkhead`] caps how many calls may be in flight against one dependency
//! at a time. Admission never waits: a call either gets a permit immediately
//! or is refused, so a slow dependency cannot queue up unbounded work.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Rejection;

/// Atomic in-flight counter with a fixed ceiling.
///
/// Share one instance per protected dependency; permits are acquired and
/// released from any thread.
#[derive(Debug)]
pub struct Bulkhead {
    max_concurrent: u32,
    in_flight: AtomicU32,
}

impl Bulkhead {
    /// Creates a bulkhead admitting at most `max_concurrent` calls at once.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            in_flight: AtomicU32::new(0),
        }
    }

    /// Attempts to take a permit; check and increment are one atomic step.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_concurrent).then_some(current + 1)
            })
            .is_ok()
    }

    /// Returns a previously acquired permit.
    pub fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "release without a matching acquire");
    }

    /// Calls currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Releases the permit on every exit path, including cancellation.
struct Permit<'a> {
    bulkhead: &'a Bulkhead,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.bulkhead.release();
    }
}

/// Runs `op` while holding a bulkhead permit.
///
/// When no permit is available the work is not invoked and the call fails
/// with [`Rejection::BulkheadFull`]. The permit is released before the
/// outcome is surfaced, on success, failure and cancellation alike.
///
/// # Errors
///
/// [`Rejection::BulkheadFull`] (through `E`) on denial, or the work's own error.
pub async fn with_bulkhead<T, E, F, Fut>(bulkhead: &Bulkhead, op: F) -> Result<T, E>
where
    E: From<Rejection>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !bulkhead.try_acquire() {
        tracing::debug!(max_concurrent = bulkhead.max_concurrent, "call denied, bulkhead is full");
        return Err(Rejection::BulkheadFull.into());
    }

    let _permit = Permit { bulkhead };
    op().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Rejected(Rejection),
        Boom,
    }

    impl From<Rejection> for TestError {
        fn from(r: Rejection) -> Self {
            Self::Rejected(r)
        }
    }

    #[test]
    fn capacity_is_enforced_and_release_frees_one_slot() {
        let bulkhead = Bulkhead::new(2);

        assert!(bulkhead.try_acquire());
        assert!(bulkhead.try_acquire());
        assert!(!bulkhead.try_acquire());
        assert_eq!(bulkhead.in_flight(), 2);

        bulkhead.release();
        assert!(bulkhead.try_acquire());
        assert!(!bulkhead.try_acquire());
    }

    #[tokio::test]
    async fn decorator_refuses_without_invoking_work() {
        let bulkhead = Bulkhead::new(1);
        assert!(bulkhead.try_acquire());

        let mut invoked = false;
        let result: Result<u32, TestError> = with_bulkhead(&bulkhead, || {
            invoked = true;
            std::future::ready(Ok(1))
        })
        .await;

        assert!(!invoked);
        assert_eq!(result.unwrap_err(), TestError::Rejected(Rejection::BulkheadFull));
    }

    #[tokio::test]
    async fn permit_is_released_on_success_and_failure() {
        let bulkhead = Bulkhead::new(1);

        let ok: Result<u32, TestError> = with_bulkhead(&bulkhead, || std::future::ready(Ok(1))).await;
        assert_eq!(ok.unwrap(), 1);
        assert_eq!(bulkhead.in_flight(), 0);

        let err: Result<u32, TestError> = with_bulkhead(&bulkhead, || std::future::ready(Err(TestError::Boom))).await;
        assert_eq!(err.unwrap_err(), TestError::Boom);
        assert_eq!(bulkhead.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn permit_is_released_when_the_call_is_cancelled() {
        use std::sync::Arc;
        use std::time::Duration;

        let bulkhead = Arc::new(Bulkhead::new(1));
        let inner = Arc::clone(&bulkhead);

        let task = tokio::spawn(async move {
            let _: Result<u32, TestError> = with_bulkhead(&inner, || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(1)
            })
            .await;
        });

        tokio::task::yield_now().await;
        assert_eq!(bulkhead.in_flight(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(bulkhead.in_flight(), 0);
    }
}
