//! Wire types of the remote state machine API.
//!
//! Field names follow the remote's JSON shapes (camelCase). Optional values are
//! `Option`s so that "not reported" stays distinct from a zero value.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sfn_converge_core::{LogLevel, ResourceIdentity, StateMachineType, TagSet};

/// Lifecycle status reported by `describe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StateMachineStatus {
    /// Still being created.
    Creating,
    /// Ready for use.
    Active,
    /// Deletion has been accepted and is in progress.
    Deleting,
    /// A status this client does not know about.
    Other(String),
}

impl StateMachineStatus {
    /// The wire value of this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Deleting => "DELETING",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for StateMachineStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CREATING" => Self::Creating,
            "ACTIVE" => Self::Active,
            "DELETING" => Self::Deleting,
            _ => Self::Other(value),
        }
    }
}

impl From<StateMachineStatus> for String {
    fn from(status: StateMachineStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for StateMachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration as the remote stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfiguration {
    /// Log level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    /// Whether execution data is included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_execution_data: Option<bool>,
    /// Log destinations (at most one is used).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<LogDestination>,
}

/// A single log destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDestination {
    /// The log group receiving the logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_watch_logs_log_group: Option<CloudWatchLogsLogGroup>,
}

/// Reference to a log group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudWatchLogsLogGroup {
    /// ARN of the log group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group_arn: Option<String>,
}

/// Tracing configuration as the remote stores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingConfiguration {
    /// Whether tracing is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// A key/value tag on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Convert a tag set into its wire list.
#[must_use]
pub fn tags_to_wire(tags: &TagSet) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag {
            key: key.to_string(),
            value: value.to_string(),
        })
        .collect()
}

/// Convert a wire tag list into a tag set.
#[must_use]
pub fn tags_from_wire(tags: Vec<Tag>) -> TagSet {
    tags.into_iter().map(|t| (t.key, t.value)).collect()
}

/// Input of `CreateStateMachine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStateMachineInput {
    /// Resource name.
    pub name: String,
    /// Definition document.
    pub definition: String,
    /// Execution role ARN.
    pub role_arn: String,
    /// Workflow type.
    #[serde(rename = "type")]
    pub machine_type: StateMachineType,
    /// Optional logging configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_configuration: Option<LoggingConfiguration>,
    /// Optional tracing configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing_configuration: Option<TracingConfiguration>,
    /// Tags applied at creation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// Output of `CreateStateMachine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStateMachineOutput {
    /// The identity assigned by the remote.
    pub state_machine_arn: ResourceIdentity,
    /// When the resource was created.
    #[serde(default, with = "epoch_seconds")]
    pub creation_date: Option<DateTime<Utc>>,
}

/// Output of `DescribeStateMachine`: the remote-observed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeStateMachineOutput {
    /// Identity of the resource.
    pub state_machine_arn: ResourceIdentity,
    /// Resource name.
    pub name: String,
    /// Lifecycle status; some endpoints omit it for active resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StateMachineStatus>,
    /// Definition document as currently stored.
    pub definition: String,
    /// Execution role ARN.
    pub role_arn: String,
    /// Workflow type.
    #[serde(rename = "type")]
    pub machine_type: StateMachineType,
    /// When the resource was created.
    #[serde(default, with = "epoch_seconds", skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    /// Logging configuration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_configuration: Option<LoggingConfiguration>,
    /// Tracing configuration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing_configuration: Option<TracingConfiguration>,
}

impl DescribeStateMachineOutput {
    /// The status label, treating an omitted status as `ACTIVE`.
    #[must_use]
    pub fn status_label(&self) -> &str {
        self.status
            .as_ref()
            .map_or("ACTIVE", StateMachineStatus::as_str)
    }
}

/// Input of `UpdateStateMachine`.
///
/// At least one of `definition` or `role_arn` must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStateMachineInput {
    /// Identity of the resource to update.
    pub state_machine_arn: ResourceIdentity,
    /// New definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    /// New role ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// New logging configuration; absent means unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_configuration: Option<LoggingConfiguration>,
    /// New tracing configuration; absent means unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing_configuration: Option<TracingConfiguration>,
}

/// Serde adapter for timestamps sent as fractional epoch seconds.
pub mod epoch_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize an optional timestamp as fractional epoch seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option, clippy::cast_precision_loss)]
    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_f64(ts.timestamp_millis() as f64 / 1000.0),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize fractional epoch seconds into an optional timestamp.
    ///
    /// # Errors
    ///
    /// Fails when the value is not a number or is out of range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(seconds) = Option::<f64>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let millis = (seconds * 1000.0).round() as i64;
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {seconds}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ARN: &str = "arn:aws:states:us-east-1:123456789012:stateMachine:orders";

    #[test]
    fn status_roundtrip() {
        for (label, status) in [
            ("CREATING", StateMachineStatus::Creating),
            ("ACTIVE", StateMachineStatus::Active),
            ("DELETING", StateMachineStatus::Deleting),
            ("UPDATING", StateMachineStatus::Other("UPDATING".to_string())),
        ] {
            assert_eq!(StateMachineStatus::from(label.to_string()), status);
            assert_eq!(status.as_str(), label);
        }
    }

    #[test]
    fn describe_output_from_wire() {
        let json = format!(
            r#"{{
                "stateMachineArn": "{ARN}",
                "name": "orders",
                "status": "ACTIVE",
                "definition": "{{}}",
                "roleArn": "arn:aws:iam::123456789012:role/sfn",
                "type": "EXPRESS",
                "creationDate": 1700000000.5,
                "loggingConfiguration": {{
                    "level": "ERROR",
                    "includeExecutionData": true,
                    "destinations": [{{"cloudWatchLogsLogGroup": {{"logGroupArn": "arn:aws:logs:us-east-1:123456789012:log-group:sfn:*"}}}}]
                }},
                "tracingConfiguration": {{"enabled": true}}
            }}"#
        );

        let output: DescribeStateMachineOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output.state_machine_arn.as_str(), ARN);
        assert_eq!(output.status, Some(StateMachineStatus::Active));
        assert_eq!(output.machine_type, StateMachineType::Express);
        assert_eq!(
            output.creation_date,
            Some(Utc.timestamp_millis_opt(1_700_000_000_500).unwrap())
        );

        let logging = output.logging_configuration.unwrap();
        assert_eq!(logging.level, Some(LogLevel::Error));
        assert_eq!(logging.include_execution_data, Some(true));
        assert_eq!(logging.destinations.len(), 1);
        assert_eq!(
            output.tracing_configuration,
            Some(TracingConfiguration {
                enabled: Some(true)
            })
        );
    }

    #[test]
    fn missing_status_reads_as_active() {
        let json = format!(
            r#"{{"stateMachineArn":"{ARN}","name":"orders","definition":"{{}}","roleArn":"r","type":"STANDARD"}}"#
        );
        let output: DescribeStateMachineOutput = serde_json::from_str(&json).unwrap();
        assert!(output.status.is_none());
        assert_eq!(output.status_label(), "ACTIVE");
        assert!(output.logging_configuration.is_none());
    }

    #[test]
    fn create_input_omits_absent_blocks() {
        let input = CreateStateMachineInput {
            name: "orders".to_string(),
            definition: "{}".to_string(),
            role_arn: "arn:aws:iam::123456789012:role/sfn".to_string(),
            machine_type: StateMachineType::Standard,
            logging_configuration: None,
            tracing_configuration: None,
            tags: Vec::new(),
        };

        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["type"], "STANDARD");
        assert_eq!(json["roleArn"], "arn:aws:iam::123456789012:role/sfn");
        assert!(json.get("loggingConfiguration").is_none());
        assert!(json.get("tracingConfiguration").is_none());
        assert!(json.get("tags").is_none());
    }

    #[test]
    fn tags_wire_conversion() {
        let tags = TagSet::from_iter([("b", "2"), ("a", "1")]);
        let wire = tags_to_wire(&tags);
        assert_eq!(wire[0].key, "a");
        assert_eq!(tags_from_wire(wire), tags);
    }
}
