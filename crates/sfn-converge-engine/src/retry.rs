//! Bounded retry of remote operations.
//!
//! [`RetryPolicy::execute`] re-runs an operation while it fails with an error
//! in a [`RetryableErrorClass`] (a set of error codes, optionally transport
//! failures too), backing off exponentially between attempts, until it
//! succeeds, fails terminally or the timeout expires.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use sfn_converge_remote::RemoteError;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors that expose a typed error code.
pub trait ErrorCode {
    /// The error code, if there is one.
    fn error_code(&self) -> Option<&str>;

    /// Whether the request never got a response.
    fn is_transport(&self) -> bool {
        false
    }
}

impl ErrorCode for RemoteError {
    fn error_code(&self) -> Option<&str> {
        self.code()
    }

    fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// The errors that are worth retrying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryableErrorClass {
    codes: BTreeSet<String>,
    transport: bool,
}

impl RetryableErrorClass {
    /// Build a class from a list of codes.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            transport: false,
        }
    }

    /// Add a code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.codes.insert(code.into());
        self
    }

    /// Also retry transport failures.
    #[must_use]
    pub fn with_transport(mut self) -> Self {
        self.transport = true;
        self
    }

    /// Everything either class retries.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            codes: self.codes.union(&other.codes).cloned().collect(),
            transport: self.transport || other.transport,
        }
    }

    /// Check whether an error belongs to this class.
    pub fn matches<E: ErrorCode>(&self, error: &E) -> bool {
        (self.transport && error.is_transport())
            || error.error_code().is_some_and(|code| self.codes.contains(code))
    }

    /// Whether transport failures are retried.
    #[must_use]
    pub const fn retries_transport(&self) -> bool {
        self.transport
    }

    /// The codes in this class.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with an error outside the retryable class.
    #[error("{0}")]
    Terminal(E),

    /// The timeout expired while the operation kept failing transiently.
    #[error("timed out after {elapsed:?} and {attempts} attempts")]
    Timeout {
        /// Time spent.
        elapsed: Duration,
        /// Number of invocations.
        attempts: u32,
        /// The last transient error, if any attempt completed.
        last: Option<E>,
    },

    /// The cancellation token fired.
    #[error("cancelled")]
    Cancelled,
}

/// Exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Growth factor per attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// The delay before retry number `retry` (0 is the first retry).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(self.multiplier.saturating_pow(retry))
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with an error outside
    /// `retryable`, or `timeout` expires.
    ///
    /// Each invocation is itself bounded by the remaining time, and every
    /// sleep races against `cancel`.
    ///
    /// # Errors
    ///
    /// - `RetryError::Terminal` for the first non-retryable error
    /// - `RetryError::Timeout` with the last transient error once `timeout` expires
    /// - `RetryError::Cancelled` if `cancel` fires
    pub async fn execute<T, E, F, Fut>(
        &self,
        timeout: Duration,
        retryable: &RetryableErrorClass,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: ErrorCode + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut attempts: u32 = 0;
        let mut last: Option<E> = None;

        loop {
            attempts += 1;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = tokio::time::timeout_at(deadline, operation()) => outcome,
            };

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => {
                    return Err(RetryError::Timeout {
                        elapsed: start.elapsed(),
                        attempts,
                        last,
                    })
                }
            };

            if !retryable.matches(&error) {
                return Err(RetryError::Terminal(error));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RetryError::Timeout {
                    elapsed: start.elapsed(),
                    attempts,
                    last: Some(error),
                });
            }

            let delay = self.backoff(attempts - 1);
            tracing::debug!(
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying after transient error"
            );
            last = Some(error);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
                () = tokio::time::sleep_until((now + delay).min(deadline)) => {}
            }
        }
    }
}
