//! The remote client boundary.
//!
//! [`StateMachineClient`] is the capability the engine consumes. Transport,
//! credentials and request signing live behind it.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sfn_converge_core::{ResourceIdentity, TagSet};

use crate::error::Result;
use crate::types::{
    CreateStateMachineInput, CreateStateMachineOutput, DescribeStateMachineOutput,
    UpdateStateMachineInput,
};

/// Operations on remote state machines.
///
/// Implementations issue stateless requests and may be shared between
/// concurrently running reconcilers.
#[async_trait]
pub trait StateMachineClient: Send + Sync {
    /// Create a state machine and return its assigned identity.
    ///
    /// # Errors
    ///
    /// Returns the remote's rejection, e.g. `StateMachineDeleting` while a
    /// resource of the same name is still being deleted.
    async fn create_state_machine(
        &self,
        input: &CreateStateMachineInput,
    ) -> Result<CreateStateMachineOutput>;

    /// Describe a state machine.
    ///
    /// # Errors
    ///
    /// Returns an error for which [`RemoteError::is_not_found`] holds when the
    /// resource does not exist.
    ///
    /// [`RemoteError::is_not_found`]: crate::RemoteError::is_not_found
    async fn describe_state_machine(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<DescribeStateMachineOutput>;

    /// Update a state machine.
    ///
    /// The call returns before the change is visible to `describe`.
    ///
    /// # Errors
    ///
    /// Returns the remote's rejection.
    async fn update_state_machine(&self, input: &UpdateStateMachineInput) -> Result<()>;

    /// Request deletion of a state machine.
    ///
    /// # Errors
    ///
    /// Returns the remote's rejection.
    async fn delete_state_machine(&self, identity: &ResourceIdentity) -> Result<()>;

    /// List the tags currently on a resource.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOperationException` when the endpoint does not support tagging.
    async fn list_tags(&self, identity: &ResourceIdentity) -> Result<TagSet>;

    /// Add or overwrite tags.
    ///
    /// # Errors
    ///
    /// Returns the remote's rejection.
    async fn tag_resource(&self, identity: &ResourceIdentity, tags: &TagSet) -> Result<()>;

    /// Remove tags by key.
    ///
    /// # Errors
    ///
    /// Returns the remote's rejection.
    async fn untag_resource(&self, identity: &ResourceIdentity, keys: &BTreeSet<String>)
        -> Result<()>;

    /// Apply a tag change: removals first, then additions.
    ///
    /// # Errors
    ///
    /// Returns the first failing call's error.
    async fn update_tags(
        &self,
        identity: &ResourceIdentity,
        to_set: &TagSet,
        to_unset: &BTreeSet<String>,
    ) -> Result<()> {
        if !to_unset.is_empty() {
            self.untag_resource(identity, to_unset).await?;
        }
        if !to_set.is_empty() {
            self.tag_resource(identity, to_set).await?;
        }
        Ok(())
    }
}
