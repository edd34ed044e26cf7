//! Engine configuration.

use std::time::Duration;

use sfn_converge_remote::codes;

use crate::error::Operation;
use crate::retry::{RetryPolicy, RetryableErrorClass};

/// Timeouts, poll cadence and retry behavior of the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bound on creating a resource, retries and the status wait included.
    pub create_timeout: Duration,
    /// Bound on waiting for an update to become visible.
    pub update_settle_timeout: Duration,
    /// Bound on waiting for a deleted resource to disappear.
    pub delete_timeout: Duration,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Consecutive not-found reads tolerated while a created resource becomes readable.
    pub not_found_checks: u32,
    /// Backoff between attempts of a remote call.
    pub retry: RetryPolicy,
    /// Errors retried on every remote call outside the waiters.
    pub transient_errors: RetryableErrorClass,
    /// Additional create errors that are retried rather than surfaced.
    pub create_retryable_errors: RetryableErrorClass,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(5 * 60),
            update_settle_timeout: Duration::from_secs(60),
            delete_timeout: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(5),
            not_found_checks: 20,
            retry: RetryPolicy::default(),
            transient_errors: RetryableErrorClass::new([codes::THROTTLING]).with_transport(),
            create_retryable_errors: RetryableErrorClass::new([
                codes::STATE_MACHINE_DELETING,
                codes::ACCESS_DENIED,
            ]),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `SFN_CONVERGE_CREATE_TIMEOUT_SECONDS`
    /// - `SFN_CONVERGE_UPDATE_SETTLE_TIMEOUT_SECONDS`
    /// - `SFN_CONVERGE_DELETE_TIMEOUT_SECONDS`
    /// - `SFN_CONVERGE_POLL_INTERVAL_SECONDS`
    /// - `SFN_CONVERGE_NOT_FOUND_CHECKS`
    /// - `SFN_CONVERGE_CREATE_RETRYABLE_ERRORS`: comma-separated error codes,
    ///   replacing the default set
    /// - `SFN_CONVERGE_TRANSIENT_ERRORS`: comma-separated error codes retried on
    ///   every call, replacing the default set; transport failures stay retried
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(d) = env_seconds("SFN_CONVERGE_CREATE_TIMEOUT_SECONDS") {
            config.create_timeout = d;
        }
        if let Some(d) = env_seconds("SFN_CONVERGE_UPDATE_SETTLE_TIMEOUT_SECONDS") {
            config.update_settle_timeout = d;
        }
        if let Some(d) = env_seconds("SFN_CONVERGE_DELETE_TIMEOUT_SECONDS") {
            config.delete_timeout = d;
        }
        if let Some(d) = env_seconds("SFN_CONVERGE_POLL_INTERVAL_SECONDS") {
            config.poll_interval = d;
        }
        if let Ok(val) = std::env::var("SFN_CONVERGE_NOT_FOUND_CHECKS") {
            if let Ok(n) = val.parse() {
                config.not_found_checks = n;
            }
        }
        if let Ok(val) = std::env::var("SFN_CONVERGE_CREATE_RETRYABLE_ERRORS") {
            config.create_retryable_errors = parse_codes(&val);
        }
        if let Ok(val) = std::env::var("SFN_CONVERGE_TRANSIENT_ERRORS") {
            config.transient_errors = parse_codes(&val).with_transport();
        }

        config
    }

    /// The overall bound on retrying one remote call of `operation`.
    #[must_use]
    pub const fn timeout_for(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create_timeout,
            Operation::Delete => self.delete_timeout,
            Operation::Read | Operation::Update | Operation::Tags => self.update_settle_timeout,
        }
    }

    /// Errors retried on create: the transient class plus the create-only codes.
    #[must_use]
    pub fn create_retry_class(&self) -> RetryableErrorClass {
        self.transient_errors.union(&self.create_retryable_errors)
    }

    /// Set the delay between polls.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

fn env_seconds(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|val| val.parse().ok())
        .map(Duration::from_secs)
}

fn parse_codes(list: &str) -> RetryableErrorClass {
    RetryableErrorClass::new(
        list.split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty()),
    )
}
