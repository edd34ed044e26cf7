//! Reconciliation pass state machine.
//!
//! Every pass walks through a fixed set of phases. Transitions are validated so
//! that, for example, tags are never touched before an attribute update has
//! settled.
//!
//! # Phases
//!
//! ```text
//!  first pass:     Idle ─▶ Creating ─▶ AwaitingCreateTerminal ─▶ Converged
//!
//!  later passes:   Idle ─▶ Diffing ─▶ Updating ─▶ AwaitingFieldSettle ─▶ Tagging ─▶ Converged
//!                              │                                            ▲
//!                              └────────────────────────────────────────────┘ (tags only / no change)
//!
//!  replacement:    Diffing ─▶ Deleting ─▶ AwaitingDeletion ─▶ Creating ─▶ ...
//!  vanished:       Diffing ─▶ Creating ─▶ ...
//!  destroy:        Idle ─▶ Deleting ─▶ AwaitingDeletion ─▶ Converged
//!
//!  Failed is reachable from every non-terminal phase.
//! ```

use serde::Serialize;

use crate::error::{ReconcileError, Result};

/// A phase of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// The create call is in flight (possibly being retried).
    Creating,
    /// Waiting for a created resource to reach its target status.
    AwaitingCreateTerminal,
    /// Comparing desired attributes against the observed resource.
    Diffing,
    /// The update call is in flight.
    Updating,
    /// Re-reading until every changed field matches.
    AwaitingFieldSettle,
    /// Reconciling tags.
    Tagging,
    /// The delete call is in flight.
    Deleting,
    /// Waiting for a deleted resource to disappear.
    AwaitingDeletion,
    /// The pass completed.
    Converged,
    /// The pass failed.
    Failed,
}

/// Validates a phase transition and returns the target phase if valid.
///
/// # Errors
///
/// Returns `ReconcileError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(resource: &str, from: Phase, to: Phase) -> Result<Phase> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ReconcileError::InvalidTransition {
            resource: resource.to_string(),
            from,
            to,
        })
    }
}

/// Check if a phase transition is valid.
#[must_use]
pub const fn is_valid_transition(from: Phase, to: Phase) -> bool {
    use Phase::{
        AwaitingCreateTerminal, AwaitingDeletion, AwaitingFieldSettle, Converged, Creating,
        Deleting, Diffing, Failed, Idle, Tagging, Updating,
    };

    matches!(
        (from, to),
        (Idle, Creating | Diffing | Deleting)
            // A vanished resource is recreated; changed immutable fields replace it
            | (Diffing, Creating | Updating | Tagging | Deleting)
            | (Updating, AwaitingFieldSettle)
            | (AwaitingFieldSettle, Tagging)
            // Synchronous kinds skip the create wait
            | (Creating, AwaitingCreateTerminal | Converged)
            | (Deleting, AwaitingDeletion)
            | (AwaitingDeletion, Creating)
            | (AwaitingCreateTerminal | Tagging | AwaitingDeletion, Converged)
    ) || (!is_terminal(from) && matches!(to, Failed))
}

/// Returns true if the pass is over.
#[must_use]
pub const fn is_terminal(phase: Phase) -> bool {
    matches!(phase, Phase::Converged | Phase::Failed)
}

/// Tracks the phase of one pass and logs every transition.
#[derive(Debug)]
pub struct Pass<'a> {
    kind: &'static str,
    resource: &'a str,
    phase: Phase,
}

impl<'a> Pass<'a> {
    /// Start a pass for a resource.
    #[must_use]
    pub const fn new(kind: &'static str, resource: &'a str) -> Self {
        Self {
            kind,
            resource,
            phase: Phase::Idle,
        }
    }

    /// The current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to the next phase.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::InvalidTransition` if the transition is not allowed.
    pub fn advance(&mut self, to: Phase) -> Result<()> {
        let from = self.phase;
        self.phase = validate_transition(self.resource, from, to)?;
        tracing::debug!(
            kind = self.kind,
            name = %self.resource,
            from = ?from,
            to = ?to,
            "Pass phase changed"
        );
        Ok(())
    }

    /// Mark the pass failed unless it already ended.
    pub fn fail(&mut self) {
        if !is_terminal(self.phase) {
            tracing::debug!(
                kind = self.kind,
                name = %self.resource,
                from = ?self.phase,
                "Pass failed"
            );
            self.phase = Phase::Failed;
        }
    }
}
