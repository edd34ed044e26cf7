//! Error types for the reconciliation engine.
//!
//! Every error surfaced by a pass names the operation and the resource it was
//! working on, and carries the resource identity whenever one had been
//! assigned, so a resource created by a failed pass can still be tracked.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use sfn_converge_core::{CoreError, ResourceIdentity};
use sfn_converge_remote::{codes, RemoteError};
use thiserror::Error;

use crate::lifecycle::Phase;
use crate::retry::RetryError;
use crate::waiter::WaitError;

/// A result type using `ReconcileError`.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// The remote operation a pass was performing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Creating the resource and awaiting its terminal status.
    Create,
    /// Reading the resource.
    Read,
    /// Updating attributes and awaiting the change to settle.
    Update,
    /// Reading or changing tags.
    Tags,
    /// Deleting the resource and awaiting its disappearance.
    Delete,
}

impl Operation {
    /// Lower-case name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Tags => "tags",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a [`ReconcileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A throttling or transport failure seen while polling during a wait.
    TransientRemote,
    /// The resource does not exist.
    NotFound,
    /// A bounded wait expired.
    Timeout,
    /// The remote refused the request (validation, permission, conflict).
    RemoteRejected,
    /// An internal invariant was violated (malformed response, unexpected status).
    Unexpected,
    /// The caller cancelled the pass.
    Cancelled,
    /// The desired state was rejected before any remote call.
    Invalid,
}

/// Errors that can occur during a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The desired state failed validation.
    #[error("invalid desired state for {resource}: {source}")]
    InvalidDesiredState {
        /// Resource name.
        resource: String,
        /// What was wrong.
        #[source]
        source: CoreError,
    },

    /// A remote call failed.
    #[error("{operation} {resource}{}: {source}", at(.identity.as_ref()))]
    Remote {
        /// The operation in progress.
        operation: Operation,
        /// Resource name.
        resource: String,
        /// Identity, if one had been assigned.
        identity: Option<ResourceIdentity>,
        /// The remote's error.
        #[source]
        source: RemoteError,
    },

    /// A bounded wait expired before the resource converged.
    #[error("{operation} {resource}{}: timed out after {elapsed:?} ({detail})", at(.identity.as_ref()))]
    Timeout {
        /// The operation in progress.
        operation: Operation,
        /// Resource name.
        resource: String,
        /// Identity, if one had been assigned.
        identity: Option<ResourceIdentity>,
        /// Time spent before giving up.
        elapsed: Duration,
        /// The last thing observed: a status, diverged fields or an error.
        detail: String,
    },

    /// The resource reported a status that is neither pending nor a target.
    #[error("{operation} {resource}{}: unexpected status {status} (expected one of {expected:?})", at(.identity.as_ref()))]
    UnexpectedState {
        /// The operation in progress.
        operation: Operation,
        /// Resource name.
        resource: String,
        /// Identity, if one had been assigned.
        identity: Option<ResourceIdentity>,
        /// The status observed.
        status: String,
        /// The statuses that would have been accepted.
        expected: Vec<String>,
    },

    /// The resource kept reading as not-found while it was expected to exist.
    #[error("{operation} {resource}{}: resource not found after {checks} checks", at(.identity.as_ref()))]
    Vanished {
        /// The operation in progress.
        operation: Operation,
        /// Resource name.
        resource: String,
        /// Identity, if one had been assigned.
        identity: Option<ResourceIdentity>,
        /// Consecutive not-found observations.
        checks: u32,
    },

    /// The pass attempted an invalid phase transition.
    #[error("invalid phase transition for {resource}: cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Resource name.
        resource: String,
        /// The current phase.
        from: Phase,
        /// The requested phase.
        to: Phase,
    },

    /// The caller cancelled the pass.
    #[error("{operation} {resource}{}: cancelled", at(.identity.as_ref()))]
    Cancelled {
        /// The operation in progress.
        operation: Operation,
        /// Resource name.
        resource: String,
        /// Identity, if one had been assigned.
        identity: Option<ResourceIdentity>,
    },
}

fn at(identity: Option<&ResourceIdentity>) -> String {
    identity.map_or_else(String::new, |id| format!(" ({id})"))
}

impl ReconcileError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDesiredState { .. } => ErrorKind::Invalid,
            Self::Remote { source, .. } => classify(source),
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::UnexpectedState { .. } | Self::InvalidTransition { .. } => ErrorKind::Unexpected,
            Self::Vanished { .. } => ErrorKind::NotFound,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// The resource identity, if one had been assigned before the failure.
    #[must_use]
    pub const fn identity(&self) -> Option<&ResourceIdentity> {
        match self {
            Self::Remote { identity, .. }
            | Self::Timeout { identity, .. }
            | Self::UnexpectedState { identity, .. }
            | Self::Vanished { identity, .. }
            | Self::Cancelled { identity, .. } => identity.as_ref(),
            Self::InvalidDesiredState { .. } | Self::InvalidTransition { .. } => None,
        }
    }

    /// The operation in progress, if the failure happened during one.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match self {
            Self::Remote { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::UnexpectedState { operation, .. }
            | Self::Vanished { operation, .. }
            | Self::Cancelled { operation, .. } => Some(*operation),
            Self::InvalidDesiredState { .. } | Self::InvalidTransition { .. } => None,
        }
    }

    /// Returns true if a later pass might succeed without changing the desired state.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientRemote | ErrorKind::Timeout)
    }

    /// Returns true for a bounded wait that expired.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Returns true when the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

fn classify(error: &RemoteError) -> ErrorKind {
    match error {
        RemoteError::Transport(_) => ErrorKind::TransientRemote,
        RemoteError::Malformed(_) => ErrorKind::Unexpected,
        RemoteError::Api { .. } if error.is_not_found() => ErrorKind::NotFound,
        RemoteError::Api { code, .. } if code == codes::THROTTLING => ErrorKind::TransientRemote,
        RemoteError::Api { .. } => ErrorKind::RemoteRejected,
    }
}

/// Operation, resource and identity attached to every error of one step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ErrorContext<'a> {
    pub operation: Operation,
    pub resource: &'a str,
    pub identity: Option<&'a ResourceIdentity>,
}

impl<'a> ErrorContext<'a> {
    pub const fn new(
        operation: Operation,
        resource: &'a str,
        identity: Option<&'a ResourceIdentity>,
    ) -> Self {
        Self {
            operation,
            resource,
            identity,
        }
    }

    pub fn remote(self, source: RemoteError) -> ReconcileError {
        ReconcileError::Remote {
            operation: self.operation,
            resource: self.resource.to_string(),
            identity: self.identity.cloned(),
            source,
        }
    }

    pub fn cancelled(self) -> ReconcileError {
        ReconcileError::Cancelled {
            operation: self.operation,
            resource: self.resource.to_string(),
            identity: self.identity.cloned(),
        }
    }

    fn timeout(self, elapsed: Duration, detail: String) -> ReconcileError {
        ReconcileError::Timeout {
            operation: self.operation,
            resource: self.resource.to_string(),
            identity: self.identity.cloned(),
            elapsed,
            detail,
        }
    }

    pub fn retry(self, error: RetryError<RemoteError>) -> ReconcileError {
        match error {
            RetryError::Terminal(source) => self.remote(source),
            RetryError::Cancelled => self.cancelled(),
            RetryError::Timeout {
                elapsed,
                attempts,
                last,
            } => {
                let detail = match last {
                    Some(e) => format!("{attempts} attempts, last error: {e}"),
                    None => format!("{attempts} attempts"),
                };
                self.timeout(elapsed, detail)
            }
        }
    }

    pub fn wait(self, error: WaitError<RemoteError>) -> ReconcileError {
        match error {
            WaitError::Refresh(source) => self.remote(source),
            WaitError::Cancelled => self.cancelled(),
            WaitError::UnexpectedState { status, expected } => ReconcileError::UnexpectedState {
                operation: self.operation,
                resource: self.resource.to_string(),
                identity: self.identity.cloned(),
                status,
                expected,
            },
            WaitError::NotFound { checks } => ReconcileError::Vanished {
                operation: self.operation,
                resource: self.resource.to_string(),
                identity: self.identity.cloned(),
                checks,
            },
            WaitError::Timeout {
                elapsed,
                last_status,
            } => self.timeout(
                elapsed,
                last_status.map_or_else(
                    || "no status observed".to_string(),
                    |s| format!("last status {s}"),
                ),
            ),
            WaitError::Unsettled { elapsed, fields } => {
                self.timeout(elapsed, format!("fields not settled: {}", fields.join(", ")))
            }
        }
    }
}
