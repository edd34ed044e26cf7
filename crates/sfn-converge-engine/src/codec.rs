//! Mapping between declared blocks and their wire representation.
//!
//! A declared block that is absent is not managed: whatever the remote holds
//! is accepted. A declared block that is present but empty is equivalent to
//! the default object the remote reports when nothing was configured.

use sfn_converge_core::{LogLevel, LoggingBlock, TracingBlock};
use sfn_converge_remote::{
    CloudWatchLogsLogGroup, LogDestination, LoggingConfiguration, TracingConfiguration,
};

/// Encode a declared logging block for the wire.
#[must_use]
pub fn expand_logging(block: &LoggingBlock) -> LoggingConfiguration {
    LoggingConfiguration {
        level: block.level,
        include_execution_data: Some(block.include_execution_data),
        destinations: block
            .log_destination
            .iter()
            .map(|arn| LogDestination {
                cloud_watch_logs_log_group: Some(CloudWatchLogsLogGroup {
                    log_group_arn: Some(arn.clone()),
                }),
            })
            .collect(),
    }
}

/// Decode a wire logging configuration. Absent stays absent.
#[must_use]
pub fn flatten_logging(wire: Option<&LoggingConfiguration>) -> Option<LoggingBlock> {
    wire.map(|wire| LoggingBlock {
        include_execution_data: wire.include_execution_data.unwrap_or(false),
        level: wire.level,
        log_destination: wire
            .destinations
            .first()
            .and_then(|d| d.cloud_watch_logs_log_group.as_ref())
            .and_then(|g| g.log_group_arn.clone()),
    })
}

/// Encode a declared tracing block for the wire.
#[must_use]
pub const fn expand_tracing(block: TracingBlock) -> TracingConfiguration {
    TracingConfiguration {
        enabled: Some(block.enabled),
    }
}

/// Decode a wire tracing configuration. Absent stays absent.
#[must_use]
pub fn flatten_tracing(wire: Option<&TracingConfiguration>) -> Option<TracingBlock> {
    wire.map(|wire| TracingBlock {
        enabled: wire.enabled.unwrap_or(false),
    })
}

/// Whether the observed logging configuration satisfies the declared block.
#[must_use]
pub fn logging_equivalent(
    desired: Option<&LoggingBlock>,
    observed: Option<&LoggingConfiguration>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    let observed = flatten_logging(observed).unwrap_or_default();

    desired.include_execution_data == observed.include_execution_data
        && desired.level.unwrap_or(LogLevel::Off) == observed.level.unwrap_or(LogLevel::Off)
        && desired.log_destination == observed.log_destination
}

/// Whether the observed tracing configuration satisfies the declared block.
#[must_use]
pub fn tracing_equivalent(
    desired: Option<&TracingBlock>,
    observed: Option<&TracingConfiguration>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    desired.enabled == flatten_tracing(observed).unwrap_or_default().enabled
}
