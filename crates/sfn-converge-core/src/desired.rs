//! Declared (desired) attributes of a state machine.
//!
//! A [`DesiredState`] is owned by the caller, immutable within one
//! reconciliation pass and supplied fresh on every pass. Optional nested
//! blocks are modelled as `Option`s so that "no block" is never confused with
//! "a block of default values".

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::document::parse_document;
use crate::error::CoreError;
use crate::ids::{is_valid_arn, validate_name};
use crate::tags::TagSet;

/// Maximum size of a definition document in bytes.
pub const MAX_DEFINITION_BYTES: usize = 1024 * 1024;

/// The user-declared attribute set for one state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Resource name. Changing it replaces the resource.
    pub name: String,
    /// ARN of the execution role.
    pub role_arn: String,
    /// The definition document. Files may declare it either as a JSON string
    /// or inline as a JSON object.
    #[serde(deserialize_with = "definition_text")]
    pub definition: String,
    /// Workflow type. Changing it replaces the resource.
    #[serde(default, rename = "type")]
    pub machine_type: StateMachineType,
    /// Optional logging block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_configuration: Option<LoggingBlock>,
    /// Optional tracing block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing_configuration: Option<TracingBlock>,
    /// Resource-level tags.
    #[serde(default)]
    pub tags: TagSet,
}

impl DesiredState {
    /// Create a desired state with the required attributes and defaults for
    /// everything else.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        role_arn: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role_arn: role_arn.into(),
            definition: definition.into(),
            machine_type: StateMachineType::default(),
            logging_configuration: None,
            tracing_configuration: None,
            tags: TagSet::new(),
        }
    }

    /// Set the workflow type.
    #[must_use]
    pub fn with_type(mut self, machine_type: StateMachineType) -> Self {
        self.machine_type = machine_type;
        self
    }

    /// Set the logging block.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingBlock) -> Self {
        self.logging_configuration = Some(logging);
        self
    }

    /// Set the tracing block.
    #[must_use]
    pub fn with_tracing(mut self, tracing: TracingBlock) -> Self {
        self.tracing_configuration = Some(tracing);
        self
    }

    /// Set the resource-level tags.
    #[must_use]
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Validate the declared attributes before any remote call is made.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure: an invalid name, a malformed role
    /// ARN, or an oversized or unparseable definition.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_name(&self.name)?;

        if !is_valid_arn(&self.role_arn) {
            return Err(CoreError::InvalidAttribute {
                field: "role_arn",
                reason: format!("{:?} is not a valid ARN", self.role_arn),
            });
        }

        if self.definition.len() > MAX_DEFINITION_BYTES {
            return Err(CoreError::InvalidAttribute {
                field: "definition",
                reason: format!(
                    "{} bytes exceeds the {MAX_DEFINITION_BYTES} byte limit",
                    self.definition.len()
                ),
            });
        }
        parse_document("definition", &self.definition)?;

        if let Some(destination) = self
            .logging_configuration
            .as_ref()
            .and_then(|l| l.log_destination.as_deref())
        {
            if !is_valid_arn(destination) {
                return Err(CoreError::InvalidAttribute {
                    field: "logging_configuration.log_destination",
                    reason: format!("{destination:?} is not a valid ARN"),
                });
            }
        }

        Ok(())
    }
}

fn definition_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}

/// Workflow type of a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateMachineType {
    /// Long-running, exactly-once workflows.
    #[default]
    Standard,
    /// High-volume, short-lived workflows.
    Express,
}

impl StateMachineType {
    /// The wire value of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Express => "EXPRESS",
        }
    }
}

impl fmt::Display for StateMachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution history log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Log every event.
    All,
    /// Log error events only.
    Error,
    /// Log fatal events only.
    Fatal,
    /// Logging disabled. This is what the remote reports when nothing was set.
    Off,
}

impl LogLevel {
    /// The wire value of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared logging block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingBlock {
    /// Whether execution input and output are included in logs.
    #[serde(default)]
    pub include_execution_data: bool,
    /// Log level. Unset means the remote default (`OFF`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    /// ARN of the log group receiving the logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_destination: Option<String>,
}

impl LoggingBlock {
    /// True when every field holds its default, i.e. the block was declared
    /// but left empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Declared tracing block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingBlock {
    /// Whether X-Ray tracing is enabled.
    #[serde(default)]
    pub enabled: bool,
}
