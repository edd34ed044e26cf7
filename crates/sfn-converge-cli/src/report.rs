//! JSON output of a command.

use serde::Serialize;
use sfn_converge_core::ResourceIdentity;
use sfn_converge_engine::{ErrorKind, Operation, ReconcileError};

/// Machine-readable form of a failed pass.
#[derive(Debug, Serialize)]
pub struct ErrorReport<'a> {
    /// Error classification.
    pub kind: ErrorKind,
    /// The operation in progress, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    /// Identity assigned before the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<&'a ResourceIdentity>,
    /// Whether rerunning the same command may succeed.
    pub retriable: bool,
    /// Human-readable message.
    pub message: String,
}

impl<'a> From<&'a ReconcileError> for ErrorReport<'a> {
    fn from(error: &'a ReconcileError) -> Self {
        Self {
            kind: error.kind(),
            operation: error.operation(),
            identity: error.identity(),
            retriable: error.is_retriable(),
            message: error.to_string(),
        }
    }
}

/// Render a value as pretty JSON.
pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
