//! Fixed-delay retry decisions for transient request failures.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying request failures and determining retry behavior.
//!
//! # Overview
//!
//! When an attempt fails, the failure is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//!
//! The [`RetryPolicy`] then decides whether another attempt is made. The
//! pause between attempts is always the same configured duration: there is
//! no backoff and no jitter, so worst-case latency is
//! `retry_attempts * wait` plus the attempts themselves.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use scrapelib::{RetryDecision, RetryPolicy, TransportError, classify_error};
//!
//! let policy = RetryPolicy::new(2, Duration::from_secs(5));
//! let error = TransportError::timeout("https://example.com/");
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(5));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("{reason}"),
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use crate::transport::TransportError;

/// Classification of request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: timeout, connection refused, 5xx responses.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, invalid URL, unsupported method.
    Permanent,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry budget with a fixed pause between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    retry_attempts: u32,

    /// Pause before each retry.
    wait: Duration,
}

impl RetryPolicy {
    /// Creates a policy allowing `retry_attempts` retries, each preceded by
    /// `wait`.
    #[must_use]
    pub fn new(retry_attempts: u32, wait: Duration) -> Self {
        Self {
            retry_attempts,
            wait,
        }
    }

    /// Creates a policy that never retries.
    #[must_use]
    pub fn no_retries() -> Self {
        Self::default()
    }

    /// Returns the number of retries after the first attempt.
    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Returns the total number of attempts, first attempt included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }

    /// Returns the pause between attempts.
    #[must_use]
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Determines whether to retry after attempt number `attempt` (1-indexed)
    /// failed with `failure_type`.
    #[instrument(skip(self), fields(retry_attempts = self.retry_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts() {
            debug!(attempt, max = self.max_attempts(), "retries exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts()),
            };
        }

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = self.wait.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay: self.wait,
            attempt: attempt + 1,
        }
    }
}

/// Classifies a transport error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Timeout | Transient |
/// | Connect | Transient |
/// | Request (body/protocol) | Transient |
/// | InvalidUrl, InvalidMethod | Permanent |
/// | MethodNotSupported | Permanent |
/// | Build | Permanent |
#[must_use]
pub fn classify_error(error: &TransportError) -> FailureType {
    match error {
        TransportError::Timeout { .. }
        | TransportError::Connect { .. }
        | TransportError::Request { .. } => FailureType::Transient,

        TransportError::InvalidUrl { .. }
        | TransportError::InvalidMethod { .. }
        | TransportError::MethodNotSupported { .. }
        | TransportError::Build { .. } => FailureType::Permanent,
    }
}

/// Classifies an unaccepted HTTP status.
///
/// Every status >= 400 is worth another try except 404, which is final
/// unless `retry_on_404` is set. Statuses below 400 are never failures and
/// classify as permanent so they are never retried.
#[must_use]
pub fn classify_status(status: u16, retry_on_404: bool) -> FailureType {
    match status {
        404 if !retry_on_404 => FailureType::Permanent,
        status if status >= 400 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}
