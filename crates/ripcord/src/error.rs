// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

use std::time::Duration;

/// The failure observed for a single attempt.
///
/// Errors raised by the unit of work itself are carried in [`AttemptError::Inner`].
/// A per-attempt timeout is deliberately kept as a distinct variant rather than
/// being folded into the inner error type, so retry policies can special-case it
/// (for example, retry on timeouts but not on permanent inner errors).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError<E> {
    /// The unit of work failed with its own error.
    #[error("{0}")]
    Inner(E),

    /// The attempt did not complete within the configured per-attempt timeout.
    ///
    /// Cancellation of the in-flight work is best-effort: the attempt future is
    /// dropped, which stops it at its next suspension point.
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

impl<E> AttemptError<E> {
    /// Returns the inner error of the unit of work, if this is not a timeout.
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::TimedOut(_) => None,
        }
    }

    /// Returns `true` if this attempt failed due to the per-attempt timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Consumes the error, returning the inner error of the unit of work.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::TimedOut(_) => None,
        }
    }
}

/// Terminal failure of a retry run.
///
/// Produced when the retry policy or stop strategy gives up. Carries the number
/// of attempts actually made and the error of the last attempt, if the last
/// attempt failed.
#[derive(Debug, thiserror::Error)]
#[error("retries exhausted after {attempts} attempt(s)")]
pub struct RetryError<E> {
    /// How many times the unit of work was invoked.
    pub attempts: u32,

    /// The failure of the final attempt, if any.
    ///
    /// `None` when the run was stopped by a [`StopStrategy`][crate::stop::StopStrategy]
    /// after a successful-but-retryable attempt.
    pub last_error: Option<AttemptError<E>>,
}

impl<E> RetryError<E> {
    /// Returns the inner error of the final failed attempt, if any.
    pub fn into_last_inner(self) -> Option<E> {
        self.last_error.and_then(AttemptError::into_inner)
    }
}

/// Denial raised by an admission control decorator before the wrapped work runs.
///
/// Each control refuses with its own variant so callers can distinguish
/// admission denials from business errors, typically to avoid retrying them.
/// Decorators surface these through the caller's error type via
/// `E: From<Rejection>`:
///
/// ```
/// use ripcord::Rejection;
///
/// #[derive(Debug)]
/// enum ApiError {
///     Rejected(Rejection),
///     Http(u16),
/// }
///
/// impl From<Rejection> for ApiError {
///     fn from(r: Rejection) -> Self {
///         Self::Rejected(r)
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Rejection {
    /// The circuit breaker is open; the downstream is presumed unhealthy.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The bulkhead has no free permits.
    #[error("bulkhead is at capacity")]
    BulkheadFull,

    /// The token bucket rate limiter has no tokens available.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The adaptive concurrency limiter refused admission.
    #[error("concurrency limit reached")]
    ConcurrencyLimited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_error_accessors() {
        let inner: AttemptError<&str> = AttemptError::Inner("boom");
        assert_eq!(inner.inner(), Some(&"boom"));
        assert!(!inner.is_timeout());
        assert_eq!(inner.into_inner(), Some("boom"));

        let timeout: AttemptError<&str> = AttemptError::TimedOut(Duration::from_secs(1));
        assert!(timeout.inner().is_none());
        assert!(timeout.is_timeout());
        assert_eq!(timeout.into_inner(), None);
    }

    #[test]
    fn retry_error_display_reports_attempts() {
        let err: RetryError<String> = RetryError {
            attempts: 3,
            last_error: Some(AttemptError::Inner("bad".to_string())),
        };
        assert_eq!(format!("{err}"), "retries exhausted after 3 attempt(s)");
        assert_eq!(err.into_last_inner().as_deref(), Some("bad"));
    }

    #[test]
    fn rejection_messages_are_distinct() {
        let all = [
            Rejection::CircuitOpen,
            Rejection::BulkheadFull,
            Rejection::RateLimited,
            Rejection::ConcurrencyLimited,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(format!("{a}"), format!("{b}"));
            }
        }
    }
}
