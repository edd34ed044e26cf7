//! The state machine resource kind.

use std::sync::Arc;

use async_trait::async_trait;
use sfn_converge_core::{documents_equal, CoreError, DesiredState, ResourceIdentity, TagDiff, TagSet};
use sfn_converge_remote::types::tags_to_wire;
use sfn_converge_remote::{
    CreateStateMachineInput, DescribeStateMachineOutput, Result as RemoteResult,
    StateMachineClient, UpdateStateMachineInput,
};

use crate::adapter::{Field, Lifecycle, ResourceAdapter};
use crate::codec::{expand_logging, expand_tracing, logging_equivalent, tracing_equivalent};

/// Field name of the definition document.
pub const DEFINITION: &str = "definition";
/// Field name of the execution role.
pub const ROLE_ARN: &str = "role_arn";
/// Field name of the logging block.
pub const LOGGING_CONFIGURATION: &str = "logging_configuration";
/// Field name of the tracing block.
pub const TRACING_CONFIGURATION: &str = "tracing_configuration";
/// Field name of the resource name.
pub const NAME: &str = "name";
/// Field name of the workflow type.
pub const TYPE: &str = "type";

const MUTABLE_FIELDS: &[Field<DesiredState, DescribeStateMachineOutput>] = &[
    Field {
        name: DEFINITION,
        equal: definition_equal,
    },
    Field {
        name: ROLE_ARN,
        equal: role_arn_equal,
    },
    Field {
        name: LOGGING_CONFIGURATION,
        equal: logging_equal,
    },
    Field {
        name: TRACING_CONFIGURATION,
        equal: tracing_equal,
    },
];

const IMMUTABLE_FIELDS: &[Field<DesiredState, DescribeStateMachineOutput>] = &[
    Field {
        name: NAME,
        equal: name_equal,
    },
    Field {
        name: TYPE,
        equal: type_equal,
    },
];

const LIFECYCLE: Lifecycle = Lifecycle {
    create_pending: &["CREATING"],
    create_target: &["ACTIVE"],
    delete_pending: &["ACTIVE", "DELETING"],
};

fn definition_equal(desired: &DesiredState, observed: &DescribeStateMachineOutput) -> bool {
    documents_equal(&desired.definition, &observed.definition)
}

fn role_arn_equal(desired: &DesiredState, observed: &DescribeStateMachineOutput) -> bool {
    desired.role_arn == observed.role_arn
}

fn logging_equal(desired: &DesiredState, observed: &DescribeStateMachineOutput) -> bool {
    logging_equivalent(
        desired.logging_configuration.as_ref(),
        observed.logging_configuration.as_ref(),
    )
}

fn tracing_equal(desired: &DesiredState, observed: &DescribeStateMachineOutput) -> bool {
    tracing_equivalent(
        desired.tracing_configuration.as_ref(),
        observed.tracing_configuration.as_ref(),
    )
}

fn name_equal(desired: &DesiredState, observed: &DescribeStateMachineOutput) -> bool {
    desired.name == observed.name
}

fn type_equal(desired: &DesiredState, observed: &DescribeStateMachineOutput) -> bool {
    desired.machine_type == observed.machine_type
}

/// Adapter driving state machines through a [`StateMachineClient`].
pub struct StateMachineAdapter<C: StateMachineClient> {
    client: Arc<C>,
}

impl<C: StateMachineClient> StateMachineAdapter<C> {
    /// Create an adapter over a shared client.
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Get a reference to the client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: StateMachineClient + 'static> ResourceAdapter for StateMachineAdapter<C> {
    type Desired = DesiredState;
    type Observed = DescribeStateMachineOutput;

    fn kind(&self) -> &'static str {
        "state machine"
    }

    fn name<'a>(&self, desired: &'a DesiredState) -> &'a str {
        &desired.name
    }

    fn tags<'a>(&self, desired: &'a DesiredState) -> &'a TagSet {
        &desired.tags
    }

    fn validate(&self, desired: &DesiredState) -> Result<(), CoreError> {
        desired.validate()
    }

    async fn create(&self, desired: &DesiredState, tags: &TagSet) -> RemoteResult<ResourceIdentity> {
        let input = CreateStateMachineInput {
            name: desired.name.clone(),
            definition: desired.definition.clone(),
            role_arn: desired.role_arn.clone(),
            machine_type: desired.machine_type,
            logging_configuration: desired.logging_configuration.as_ref().map(expand_logging),
            tracing_configuration: desired.tracing_configuration.map(expand_tracing),
            tags: tags_to_wire(tags),
        };

        let output = self.client.create_state_machine(&input).await?;
        Ok(output.state_machine_arn)
    }

    async fn describe(&self, identity: &ResourceIdentity) -> RemoteResult<DescribeStateMachineOutput> {
        self.client.describe_state_machine(identity).await
    }

    async fn update(
        &self,
        identity: &ResourceIdentity,
        desired: &DesiredState,
        changed: &[&'static str],
    ) -> RemoteResult<()> {
        // The remote requires the definition or the role on every update.
        let input = UpdateStateMachineInput {
            state_machine_arn: identity.clone(),
            definition: Some(desired.definition.clone()),
            role_arn: Some(desired.role_arn.clone()),
            logging_configuration: if changed.contains(&LOGGING_CONFIGURATION) {
                desired.logging_configuration.as_ref().map(expand_logging)
            } else {
                None
            },
            tracing_configuration: if changed.contains(&TRACING_CONFIGURATION) {
                desired.tracing_configuration.map(expand_tracing)
            } else {
                None
            },
        };

        self.client.update_state_machine(&input).await
    }

    async fn delete(&self, identity: &ResourceIdentity) -> RemoteResult<()> {
        self.client.delete_state_machine(identity).await
    }

    async fn list_tags(&self, identity: &ResourceIdentity) -> RemoteResult<TagSet> {
        self.client.list_tags(identity).await
    }

    async fn update_tags(&self, identity: &ResourceIdentity, diff: &TagDiff) -> RemoteResult<()> {
        self.client
            .update_tags(identity, &diff.to_set, &diff.to_unset)
            .await
    }

    fn status<'a>(&self, observed: &'a DescribeStateMachineOutput) -> &'a str {
        observed.status_label()
    }

    fn mutable_fields(&self) -> &[Field<DesiredState, DescribeStateMachineOutput>] {
        MUTABLE_FIELDS
    }

    fn immutable_fields(&self) -> &[Field<DesiredState, DescribeStateMachineOutput>] {
        IMMUTABLE_FIELDS
    }

    fn lifecycle(&self) -> Lifecycle {
        LIFECYCLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::diverged;
    use sfn_converge_core::{LogLevel, LoggingBlock, StateMachineType, TracingBlock};
    use sfn_converge_remote::{LoggingConfiguration, MockStateMachineClient, TracingConfiguration};

    const ROLE: &str = "arn:aws:iam::123456789012:role/sfn";
    const DEFINITION_DOC: &str = r#"{"StartAt":"A","States":{"A":{"Type":"Pass","End":true}}}"#;

    fn adapter() -> StateMachineAdapter<MockStateMachineClient> {
        StateMachineAdapter::new(Arc::new(MockStateMachineClient::new()))
    }

    fn desired() -> DesiredState {
        DesiredState::new("orders", ROLE, DEFINITION_DOC)
    }

    #[tokio::test]
    async fn created_resource_matches_every_field() {
        let adapter = adapter();
        let desired = desired()
            .with_logging(LoggingBlock::default())
            .with_tracing(TracingBlock::default());

        let id = adapter.create(&desired, &TagSet::new()).await.unwrap();
        let observed = adapter.describe(&id).await.unwrap();

        assert!(diverged(adapter.mutable_fields(), &desired, &observed).is_empty());
        assert!(diverged(adapter.immutable_fields(), &desired, &observed).is_empty());
        assert_eq!(adapter.status(&observed), "ACTIVE");
    }

    #[tokio::test]
    async fn reformatted_definition_is_not_a_change() {
        let adapter = adapter();
        let id = adapter.create(&desired(), &TagSet::new()).await.unwrap();
        adapter.client().modify(&id, |m| {
            m.definition = "{\n  \"States\": {\"A\": {\"End\": true, \"Type\": \"Pass\"}},\n  \"StartAt\": \"A\"\n}"
                .to_string();
        });

        let observed = adapter.describe(&id).await.unwrap();
        assert!(diverged(adapter.mutable_fields(), &desired(), &observed).is_empty());
    }

    #[tokio::test]
    async fn changed_fields_are_named() {
        let adapter = adapter();
        let id = adapter.create(&desired(), &TagSet::new()).await.unwrap();
        let observed = adapter.describe(&id).await.unwrap();

        let changed = desired()
            .with_logging(LoggingBlock {
                include_execution_data: true,
                level: Some(LogLevel::All),
                log_destination: None,
            })
            .with_type(StateMachineType::Express);
        let mut renamed = changed.clone();
        renamed.role_arn = "arn:aws:iam::123456789012:role/other".to_string();

        assert_eq!(
            diverged(adapter.mutable_fields(), &renamed, &observed),
            vec![ROLE_ARN, LOGGING_CONFIGURATION]
        );
        assert_eq!(
            diverged(adapter.immutable_fields(), &changed, &observed),
            vec![TYPE]
        );
    }

    #[tokio::test]
    async fn update_sends_blocks_only_when_changed() {
        let adapter = adapter();
        let id = adapter.create(&desired(), &TagSet::new()).await.unwrap();
        let desired = desired()
            .with_logging(LoggingBlock {
                level: Some(LogLevel::Error),
                ..LoggingBlock::default()
            })
            .with_tracing(TracingBlock { enabled: true });

        adapter
            .update(&id, &desired, &[TRACING_CONFIGURATION])
            .await
            .unwrap();

        let sent = &adapter.client().updates()[0];
        assert_eq!(sent.definition.as_deref(), Some(DEFINITION_DOC));
        assert_eq!(sent.role_arn.as_deref(), Some(ROLE));
        assert_eq!(sent.logging_configuration, None::<LoggingConfiguration>);
        assert_eq!(
            sent.tracing_configuration,
            Some(TracingConfiguration {
                enabled: Some(true)
            })
        );
    }
}
