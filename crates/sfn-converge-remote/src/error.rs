//! Error types for the remote boundary.

use thiserror::Error;

/// Error codes the remote control plane is known to return.
pub mod codes {
    /// The state machine does not exist (or no longer exists).
    pub const STATE_MACHINE_DOES_NOT_EXIST: &str = "StateMachineDoesNotExist";
    /// A state machine with this name is still being deleted.
    pub const STATE_MACHINE_DELETING: &str = "StateMachineDeleting";
    /// A state machine with this name already exists with a different configuration.
    pub const STATE_MACHINE_ALREADY_EXISTS: &str = "StateMachineAlreadyExists";
    /// The caller or the referenced role is not (yet) authorized.
    pub const ACCESS_DENIED: &str = "AccessDeniedException";
    /// The request rate is too high.
    pub const THROTTLING: &str = "ThrottlingException";
    /// The operation is not supported by this endpoint.
    pub const UNKNOWN_OPERATION: &str = "UnknownOperationException";
    /// The tagged resource does not exist.
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
    /// A request parameter failed validation.
    pub const VALIDATION: &str = "ValidationException";
    /// A required request parameter is missing.
    pub const MISSING_REQUIRED_PARAMETER: &str = "MissingRequiredParameter";
    /// The definition document was rejected.
    pub const INVALID_DEFINITION: &str = "InvalidDefinition";
}

/// Errors returned by a [`StateMachineClient`](crate::StateMachineClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote API answered with a typed error.
    #[error("{code}: {message}")]
    Api {
        /// The error code (e.g. `StateMachineDoesNotExist`).
        code: String,
        /// Human-readable message from the remote.
        message: String,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The response could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Build a typed API error.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The typed error code, if the remote provided one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::Transport(_) | Self::Malformed(_) => None,
        }
    }

    /// Check whether this is an API error with the given code.
    #[must_use]
    pub fn is_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }

    /// True for the not-found signatures, distinguishable from every other error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.is_code(codes::STATE_MACHINE_DOES_NOT_EXIST) || self.is_code(codes::RESOURCE_NOT_FOUND)
    }

    /// True when the response was unusable rather than a rejection.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// A specialized Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguishable() {
        assert!(RemoteError::api(codes::STATE_MACHINE_DOES_NOT_EXIST, "gone").is_not_found());
        assert!(RemoteError::api(codes::RESOURCE_NOT_FOUND, "gone").is_not_found());
        assert!(!RemoteError::api(codes::ACCESS_DENIED, "no").is_not_found());
        assert!(!RemoteError::Transport("reset".to_string()).is_not_found());
    }

    #[test]
    fn codes_only_on_api_errors() {
        let err = RemoteError::api(codes::THROTTLING, "slow down");
        assert_eq!(err.code(), Some(codes::THROTTLING));
        assert!(err.is_code(codes::THROTTLING));
        assert_eq!(err.to_string(), "ThrottlingException: slow down");

        assert_eq!(RemoteError::Malformed("empty".to_string()).code(), None);
        assert!(RemoteError::Malformed("empty".to_string()).is_malformed());
    }
}
