//! Common error types for sfn-converge.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors raised while validating identifiers and declared attributes.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The identity string is not a well-formed ARN.
    #[error("invalid resource identity {0:?}: expected arn:<partition>:<service>:<region>:<account>:<resource>")]
    InvalidIdentity(String),

    /// The resource name violates the naming rules.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// A document attribute could not be parsed as JSON.
    #[error("invalid {field} document: {source}")]
    InvalidDocument {
        /// The attribute holding the document.
        field: &'static str,
        /// The parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// A declared attribute is outside its allowed range.
    #[error("invalid {field}: {reason}")]
    InvalidAttribute {
        /// The attribute that failed validation.
        field: &'static str,
        /// Why it failed.
        reason: String,
    },
}
