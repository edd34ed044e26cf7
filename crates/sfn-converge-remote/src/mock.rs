//! In-memory control plane for testing.
//!
//! [`MockStateMachineClient`] keeps state machines in a map and reproduces the
//! behaviors the engine has to cope with: updates that become visible only
//! after a number of reads, deletions that linger in `DELETING`, freshly
//! created resources that are briefly unreadable, remote defaults for blocks
//! that were never set, and scripted failures per operation.

use std::collections::{BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sfn_converge_core::{LogLevel, ResourceIdentity, TagSet};

use crate::client::StateMachineClient;
use crate::error::{codes, RemoteError, Result};
use crate::types::{
    tags_from_wire, CreateStateMachineInput, CreateStateMachineOutput,
    DescribeStateMachineOutput, LoggingConfiguration, StateMachineStatus, TracingConfiguration,
    UpdateStateMachineInput,
};

/// ARN prefix used for state machines created by the mock.
pub const MOCK_ARN_PREFIX: &str = "arn:aws:states:us-east-1:123456789012:stateMachine:";

/// The identity the mock assigns to a state machine with this name.
///
/// # Panics
///
/// Panics if `name` produces an invalid ARN (e.g. it is empty).
#[must_use]
pub fn mock_identity(name: &str) -> ResourceIdentity {
    ResourceIdentity::parse(format!("{MOCK_ARN_PREFIX}{name}"))
        .unwrap_or_else(|e| panic!("invalid mock identity for {name:?}: {e}"))
}

/// Operations whose outcome can be scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// `CreateStateMachine`.
    Create,
    /// `DescribeStateMachine`.
    Describe,
    /// `UpdateStateMachine`.
    Update,
    /// `DeleteStateMachine`.
    Delete,
    /// `ListTagsForResource`.
    ListTags,
    /// `TagResource`.
    Tag,
    /// `UntagResource`.
    Untag,
}

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Create calls.
    pub create: u32,
    /// Describe calls.
    pub describe: u32,
    /// Update calls.
    pub update: u32,
    /// Delete calls.
    pub delete: u32,
    /// List-tags calls.
    pub list_tags: u32,
    /// Tag calls.
    pub tag: u32,
    /// Untag calls.
    pub untag: u32,
}

impl CallCounts {
    fn record(&mut self, operation: MockOperation) {
        let counter = match operation {
            MockOperation::Create => &mut self.create,
            MockOperation::Describe => &mut self.describe,
            MockOperation::Update => &mut self.update,
            MockOperation::Delete => &mut self.delete,
            MockOperation::ListTags => &mut self.list_tags,
            MockOperation::Tag => &mut self.tag,
            MockOperation::Untag => &mut self.untag,
        };
        *counter += 1;
    }

    /// Number of calls that change remote state.
    #[must_use]
    pub const fn mutations(&self) -> u32 {
        self.create + self.update + self.delete + self.tag + self.untag
    }
}

/// A mock control plane that stores state machines in memory.
pub struct MockStateMachineClient {
    state: Mutex<MockState>,
}

struct MockState {
    machines: HashMap<ResourceIdentity, MockMachine>,
    failures: HashMap<MockOperation, VecDeque<RemoteError>>,
    calls: CallCounts,
    updates: Vec<UpdateStateMachineInput>,
    update_lag: u32,
    delete_lag: u32,
    create_lag: u32,
    create_invisible_reads: u32,
    tagging_supported: bool,
}

struct MockMachine {
    current: DescribeStateMachineOutput,
    pending: Option<PendingUpdate>,
    tags: TagSet,
    hidden_reads: u32,
    creating_reads: u32,
    deleting_reads: Option<u32>,
}

struct PendingUpdate {
    target: DescribeStateMachineOutput,
    stale_reads: u32,
}

impl Default for MockStateMachineClient {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState {
                machines: HashMap::new(),
                failures: HashMap::new(),
                calls: CallCounts::default(),
                updates: Vec::new(),
                update_lag: 0,
                delete_lag: 0,
                create_lag: 0,
                create_invisible_reads: 0,
                tagging_supported: true,
            }),
        }
    }
}

impl MockStateMachineClient {
    /// Create an empty mock control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of describe calls that still return the old attributes after an
    /// update. `u32::MAX` makes updates effectively never visible.
    pub fn set_update_lag(&self, reads: u32) {
        self.state.lock().update_lag = reads;
    }

    /// Number of describe calls that report `DELETING` after a delete request
    /// before the resource disappears.
    pub fn set_delete_lag(&self, reads: u32) {
        self.state.lock().delete_lag = reads;
    }

    /// Number of describe calls that report `CREATING` after a create.
    pub fn set_create_lag(&self, reads: u32) {
        self.state.lock().create_lag = reads;
    }

    /// Number of describe calls that report not-found right after a create.
    pub fn set_create_invisible_reads(&self, reads: u32) {
        self.state.lock().create_invisible_reads = reads;
    }

    /// Whether the tag listing operation is supported.
    pub fn set_tagging_supported(&self, supported: bool) {
        self.state.lock().tagging_supported = supported;
    }

    /// Make the next call of `operation` fail with `error`. Failures queue up
    /// and are consumed in order.
    pub fn push_failure(&self, operation: MockOperation, error: RemoteError) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Add a tag on the remote side, outside of any reconciliation.
    pub fn inject_tag(&self, identity: &ResourceIdentity, key: &str, value: &str) {
        if let Some(machine) = self.state.lock().machines.get_mut(identity) {
            machine.tags.insert(key, value);
        }
    }

    /// Change a machine's stored attributes out of band (drift).
    pub fn modify(&self, identity: &ResourceIdentity, f: impl FnOnce(&mut DescribeStateMachineOutput)) {
        if let Some(machine) = self.state.lock().machines.get_mut(identity) {
            f(&mut machine.current);
        }
    }

    /// Remove a machine out of band.
    pub fn remove(&self, identity: &ResourceIdentity) {
        self.state.lock().machines.remove(identity);
    }

    /// The attributes currently visible for a machine.
    #[must_use]
    pub fn machine(&self, identity: &ResourceIdentity) -> Option<DescribeStateMachineOutput> {
        self.state
            .lock()
            .machines
            .get(identity)
            .map(|m| m.current.clone())
    }

    /// The tags currently on a machine.
    #[must_use]
    pub fn tags(&self, identity: &ResourceIdentity) -> Option<TagSet> {
        self.state
            .lock()
            .machines
            .get(identity)
            .map(|m| m.tags.clone())
    }

    /// Number of machines known to the mock, including those being deleted.
    #[must_use]
    pub fn machine_count(&self) -> usize {
        self.state.lock().machines.len()
    }

    /// Call counts so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    /// Reset call counts and the recorded update inputs.
    pub fn reset_calls(&self) {
        let mut state = self.state.lock();
        state.calls = CallCounts::default();
        state.updates.clear();
    }

    /// Every update input received, in order.
    #[must_use]
    pub fn updates(&self) -> Vec<UpdateStateMachineInput> {
        self.state.lock().updates.clone()
    }
}

impl MockState {
    /// Count the call and pop a scripted failure, if any.
    fn begin(&mut self, operation: MockOperation) -> Result<()> {
        self.calls.record(operation);
        match self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn existing(&mut self, identity: &ResourceIdentity) -> Result<&mut MockMachine> {
        self.machines
            .get_mut(identity)
            .ok_or_else(|| not_found(identity))
    }
}

fn not_found(identity: &ResourceIdentity) -> RemoteError {
    RemoteError::api(
        codes::STATE_MACHINE_DOES_NOT_EXIST,
        format!("State Machine Does Not Exist: '{identity}'"),
    )
}

fn tag_target_not_found(identity: &ResourceIdentity) -> RemoteError {
    RemoteError::api(
        codes::RESOURCE_NOT_FOUND,
        format!("Resource not found: '{identity}'"),
    )
}

/// What the remote stores when a logging block was never set.
fn default_logging() -> LoggingConfiguration {
    LoggingConfiguration {
        level: Some(LogLevel::Off),
        include_execution_data: Some(false),
        destinations: Vec::new(),
    }
}

#[async_trait]
impl StateMachineClient for MockStateMachineClient {
    async fn create_state_machine(
        &self,
        input: &CreateStateMachineInput,
    ) -> Result<CreateStateMachineOutput> {
        let mut state = self.state.lock();
        state.begin(MockOperation::Create)?;

        let identity = ResourceIdentity::parse(format!("{MOCK_ARN_PREFIX}{}", input.name))
            .map_err(|e| RemoteError::api(codes::VALIDATION, e.to_string()))?;
        if let Some(existing) = state.machines.get(&identity) {
            if existing.deleting_reads.is_some() {
                return Err(RemoteError::api(
                    codes::STATE_MACHINE_DELETING,
                    format!("State Machine is being deleted: '{identity}'"),
                ));
            }
            return Err(RemoteError::api(
                codes::STATE_MACHINE_ALREADY_EXISTS,
                format!("State Machine Already Exists: '{identity}'"),
            ));
        }

        let creation_date = Some(Utc::now());
        let current = DescribeStateMachineOutput {
            state_machine_arn: identity.clone(),
            name: input.name.clone(),
            status: Some(StateMachineStatus::Active),
            definition: input.definition.clone(),
            role_arn: input.role_arn.clone(),
            machine_type: input.machine_type,
            creation_date,
            logging_configuration: Some(
                input
                    .logging_configuration
                    .clone()
                    .unwrap_or_else(default_logging),
            ),
            tracing_configuration: Some(input.tracing_configuration.unwrap_or(
                TracingConfiguration {
                    enabled: Some(false),
                },
            )),
        };

        let machine = MockMachine {
            current,
            pending: None,
            tags: tags_from_wire(input.tags.clone()),
            hidden_reads: state.create_invisible_reads,
            creating_reads: state.create_lag,
            deleting_reads: None,
        };
        state.machines.insert(identity.clone(), machine);

        Ok(CreateStateMachineOutput {
            state_machine_arn: identity,
            creation_date,
        })
    }

    async fn describe_state_machine(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<DescribeStateMachineOutput> {
        let mut state = self.state.lock();
        state.begin(MockOperation::Describe)?;

        let machine = state.existing(identity)?;

        if machine.hidden_reads > 0 {
            machine.hidden_reads -= 1;
            return Err(not_found(identity));
        }

        if let Some(remaining) = machine.deleting_reads {
            if remaining == 0 {
                state.machines.remove(identity);
                return Err(not_found(identity));
            }
            machine.deleting_reads = Some(remaining - 1);
            let mut snapshot = machine.current.clone();
            snapshot.status = Some(StateMachineStatus::Deleting);
            return Ok(snapshot);
        }

        if machine.creating_reads > 0 {
            machine.creating_reads -= 1;
            let mut snapshot = machine.current.clone();
            snapshot.status = Some(StateMachineStatus::Creating);
            return Ok(snapshot);
        }

        if let Some(pending) = machine.pending.as_mut() {
            if pending.stale_reads == 0 {
                if let Some(pending) = machine.pending.take() {
                    machine.current = pending.target;
                }
            } else {
                pending.stale_reads -= 1;
            }
        }

        Ok(machine.current.clone())
    }

    async fn update_state_machine(&self, input: &UpdateStateMachineInput) -> Result<()> {
        let mut state = self.state.lock();
        state.begin(MockOperation::Update)?;
        state.updates.push(input.clone());

        if input.definition.is_none() && input.role_arn.is_none() {
            return Err(RemoteError::api(
                codes::MISSING_REQUIRED_PARAMETER,
                "Either the definition or the roleArn must be specified",
            ));
        }

        let lag = state.update_lag;
        let machine = state.existing(&input.state_machine_arn)?;
        if machine.deleting_reads.is_some() {
            return Err(RemoteError::api(
                codes::STATE_MACHINE_DELETING,
                "State Machine is being deleted",
            ));
        }

        let mut target = machine
            .pending
            .take()
            .map_or_else(|| machine.current.clone(), |p| p.target);
        if let Some(definition) = &input.definition {
            target.definition.clone_from(definition);
        }
        if let Some(role_arn) = &input.role_arn {
            target.role_arn.clone_from(role_arn);
        }
        if let Some(logging) = &input.logging_configuration {
            target.logging_configuration = Some(logging.clone());
        }
        if let Some(tracing) = input.tracing_configuration {
            target.tracing_configuration = Some(tracing);
        }

        if lag == 0 {
            machine.current = target;
        } else {
            machine.pending = Some(PendingUpdate {
                target,
                stale_reads: lag,
            });
        }
        Ok(())
    }

    async fn delete_state_machine(&self, identity: &ResourceIdentity) -> Result<()> {
        let mut state = self.state.lock();
        state.begin(MockOperation::Delete)?;

        let lag = state.delete_lag;
        let machine = state.existing(identity)?;
        if machine.deleting_reads.is_some() {
            return Ok(());
        }

        if lag == 0 {
            state.machines.remove(identity);
        } else {
            machine.deleting_reads = Some(lag);
        }
        Ok(())
    }

    async fn list_tags(&self, identity: &ResourceIdentity) -> Result<TagSet> {
        let mut state = self.state.lock();
        state.begin(MockOperation::ListTags)?;

        if !state.tagging_supported {
            return Err(RemoteError::api(
                codes::UNKNOWN_OPERATION,
                "ListTagsForResource is not supported",
            ));
        }

        state
            .machines
            .get(identity)
            .map(|m| m.tags.clone())
            .ok_or_else(|| tag_target_not_found(identity))
    }

    async fn tag_resource(&self, identity: &ResourceIdentity, tags: &TagSet) -> Result<()> {
        let mut state = self.state.lock();
        state.begin(MockOperation::Tag)?;

        let machine = state
            .machines
            .get_mut(identity)
            .ok_or_else(|| tag_target_not_found(identity))?;
        machine.tags.extend(tags.iter());
        Ok(())
    }

    async fn untag_resource(
        &self,
        identity: &ResourceIdentity,
        keys: &BTreeSet<String>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.begin(MockOperation::Untag)?;

        let machine = state
            .machines
            .get_mut(identity)
            .ok_or_else(|| tag_target_not_found(identity))?;
        for key in keys {
            machine.tags.remove(key);
        }
        Ok(())
    }
}
