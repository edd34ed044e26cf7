//! Identifier types for sfn-converge.
//!
//! The remote control plane assigns every resource an ARN when it is created.
//! That string is the only durable artifact the engine owns; everything else is
//! re-derived from `describe` on each pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Maximum length of a state machine name.
pub const MAX_NAME_LEN: usize = 80;

/// An opaque, remote-assigned resource identifier (an ARN).
///
/// Identities are created once, on successful creation, and never mutated.
/// Parsing checks only the ARN envelope; the resource part is opaque.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceIdentity(String);

impl ResourceIdentity {
    /// Parse an identity from its ARN string.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidIdentity` if the string does not have the
    /// `arn:partition:service:region:account:resource` shape.
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if is_valid_arn(&s) {
            Ok(Self(s))
        } else {
            Err(CoreError::InvalidIdentity(s))
        }
    }

    /// Return the ARN string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing resource segment of the ARN.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.0.splitn(6, ':').nth(5).unwrap_or_default()
    }

    /// The resource name: the last `:`-separated segment of the ARN.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or_default()
    }
}

/// Check that `s` has the six-part ARN envelope with non-empty partition,
/// service and resource.
#[must_use]
pub fn is_valid_arn(s: &str) -> bool {
    let parts: Vec<&str> = s.splitn(6, ':').collect();
    parts.len() == 6
        && parts[0] == "arn"
        && !parts[1].is_empty()
        && !parts[2].is_empty()
        && !parts[5].is_empty()
}

/// Validate a state machine name.
///
/// Names are 1 to 80 characters drawn from ASCII letters, digits, `-` and `_`.
///
/// # Errors
///
/// Returns `CoreError::InvalidName` describing the first violated rule.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("must be at most 80 characters")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Some("only alphanumeric characters, hyphens and underscores are allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CoreError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

impl fmt::Debug for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceIdentity({})", self.0)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceIdentity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceIdentity {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ResourceIdentity> for String {
    fn from(id: ResourceIdentity) -> Self {
        id.0
    }
}

impl AsRef<str> for ResourceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
