//! The convergence reconciler.
//!
//! One call to [`Reconciler::reconcile`] is one pass: it creates the resource
//! when there is no identity yet, and otherwise compares the declared state
//! with a fresh `describe`, replaces the resource when an immutable field
//! changed, updates mutable fields and waits for them to settle, then brings
//! the tags in line. No state is kept between passes.

use std::future::Future;

use serde::Serialize;
use sfn_converge_core::{ResourceIdentity, TagPolicy, TagSet};
use sfn_converge_remote::{codes, RemoteError, Result as RemoteResult};
use tokio_util::sync::CancellationToken;

use crate::adapter::{diverged, ResourceAdapter};
use crate::config::EngineConfig;
use crate::error::{ErrorContext, Operation, ReconcileError, Result};
use crate::lifecycle::{Pass, Phase};
use crate::retry::RetryError;
use crate::waiter::{Observation, Settle, SettleWaiter, StateWaiter, WaitError};

/// What a pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The resource was created.
    Created,
    /// Mutable fields were updated (tags may have changed too).
    Updated {
        /// The fields that were changed.
        fields: Vec<&'static str>,
    },
    /// Only tags changed.
    TagsUpdated,
    /// The resource was deleted and created again because an immutable field changed.
    Replaced,
    /// Nothing needed to change.
    Unchanged,
}

/// The result of a pass.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciled<O> {
    /// The resource identity.
    pub identity: ResourceIdentity,
    /// The last observed snapshot.
    pub observed: O,
    /// Resource-level tags, default tags hidden.
    pub tags: TagSet,
    /// All managed tags on the resource.
    pub tags_all: TagSet,
    /// What the pass did.
    pub outcome: Outcome,
}

/// Drives resources of one kind to their declared state.
pub struct Reconciler<A: ResourceAdapter> {
    adapter: A,
    config: EngineConfig,
    tags: TagPolicy,
}

impl<A: ResourceAdapter> Reconciler<A> {
    /// Create a reconciler.
    #[must_use]
    pub fn new(adapter: A, config: EngineConfig, tags: TagPolicy) -> Self {
        Self {
            adapter,
            config,
            tags,
        }
    }

    /// Create a reconciler with the default configuration and no tag policy.
    #[must_use]
    pub fn with_defaults(adapter: A) -> Self {
        Self::new(adapter, EngineConfig::default(), TagPolicy::default())
    }

    /// Get a reference to the adapter.
    #[must_use]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get a reference to the tag policy.
    #[must_use]
    pub fn tag_policy(&self) -> &TagPolicy {
        &self.tags
    }

    /// Run one pass for `desired`.
    ///
    /// Without `previous_identity` the resource is created. With one, the
    /// resource is read and updated in place, replaced, or recreated if it no
    /// longer exists.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the pass. Once an identity has been
    /// assigned, [`ReconcileError::identity`] reports it.
    pub async fn reconcile(
        &self,
        desired: &A::Desired,
        previous_identity: Option<&ResourceIdentity>,
        cancel: &CancellationToken,
    ) -> Result<Reconciled<A::Observed>> {
        let name = self.adapter.name(desired);
        let mut pass = Pass::new(self.adapter.kind(), name);

        let result = self
            .run_reconcile(&mut pass, desired, previous_identity, cancel)
            .await;
        if let Err(error) = &result {
            pass.fail();
            tracing::warn!(
                kind = self.adapter.kind(),
                name = %name,
                error = %error,
                "Reconciliation failed"
            );
        }
        result
    }

    /// Delete the resource and wait until it is gone.
    ///
    /// # Errors
    ///
    /// Returns an error of kind `NotFound` if the resource does not exist,
    /// and `Timeout` if it is still present after the delete timeout.
    pub async fn destroy(
        &self,
        identity: &ResourceIdentity,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let name = identity.name();
        let mut pass = Pass::new(self.adapter.kind(), name);

        let result = self.run_destroy(&mut pass, identity, name, cancel).await;
        if let Err(error) = &result {
            pass.fail();
            tracing::warn!(
                kind = self.adapter.kind(),
                identity = %identity,
                error = %error,
                "Deletion failed"
            );
        }
        result
    }

    /// Read the resource and its tags. Returns `None` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns any failure other than not-found.
    pub async fn show(
        &self,
        identity: &ResourceIdentity,
        cancel: &CancellationToken,
    ) -> Result<Option<Reconciled<A::Observed>>> {
        let name = identity.name();
        let Some(observed) = self.read(identity, name, cancel).await? else {
            tracing::warn!(
                kind = self.adapter.kind(),
                identity = %identity,
                "Resource not found"
            );
            return Ok(None);
        };

        let remote = self.read_tags(identity, name, cancel).await?;
        let (tags, tags_all) = self.tag_views(remote.as_ref(), &TagSet::new());

        Ok(Some(Reconciled {
            identity: identity.clone(),
            observed,
            tags,
            tags_all,
            outcome: Outcome::Unchanged,
        }))
    }

    async fn run_reconcile(
        &self,
        pass: &mut Pass<'_>,
        desired: &A::Desired,
        previous_identity: Option<&ResourceIdentity>,
        cancel: &CancellationToken,
    ) -> Result<Reconciled<A::Observed>> {
        let name = self.adapter.name(desired);
        self.adapter
            .validate(desired)
            .map_err(|source| ReconcileError::InvalidDesiredState {
                resource: name.to_string(),
                source,
            })?;
        let effective = self.tags.effective(self.adapter.tags(desired));

        let Some(identity) = previous_identity else {
            return self
                .create(pass, desired, &effective, Outcome::Created, cancel)
                .await;
        };

        pass.advance(Phase::Diffing)?;
        let Some(observed) = self.read(identity, name, cancel).await? else {
            tracing::warn!(
                kind = self.adapter.kind(),
                name = %name,
                identity = %identity,
                "Resource no longer exists, recreating"
            );
            return self
                .create(pass, desired, &effective, Outcome::Created, cancel)
                .await;
        };

        let replace = diverged(self.adapter.immutable_fields(), desired, &observed);
        if !replace.is_empty() {
            tracing::info!(
                kind = self.adapter.kind(),
                name = %name,
                identity = %identity,
                fields = ?replace,
                "Immutable fields changed, replacing resource"
            );
            self.delete_and_wait(pass, identity, name, cancel).await?;
            return self
                .create(pass, desired, &effective, Outcome::Replaced, cancel)
                .await;
        }

        let changed = diverged(self.adapter.mutable_fields(), desired, &observed);
        let observed = if changed.is_empty() {
            observed
        } else {
            self.update(pass, identity, desired, &changed, cancel).await?
        };

        pass.advance(Phase::Tagging)?;
        let (remote, tags_changed) = self.sync_tags(identity, name, &effective, cancel).await?;
        let (tags, tags_all) = self.tag_views(remote.as_ref(), &effective);

        let outcome = if !changed.is_empty() {
            Outcome::Updated { fields: changed }
        } else if tags_changed {
            Outcome::TagsUpdated
        } else {
            Outcome::Unchanged
        };
        pass.advance(Phase::Converged)?;

        Ok(Reconciled {
            identity: identity.clone(),
            observed,
            tags,
            tags_all,
            outcome,
        })
    }

    async fn run_destroy(
        &self,
        pass: &mut Pass<'_>,
        identity: &ResourceIdentity,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.delete_and_wait(pass, identity, name, cancel).await?;
        pass.advance(Phase::Converged)
    }

    async fn create(
        &self,
        pass: &mut Pass<'_>,
        desired: &A::Desired,
        effective: &TagSet,
        outcome: Outcome,
        cancel: &CancellationToken,
    ) -> Result<Reconciled<A::Observed>> {
        let name = self.adapter.name(desired);
        pass.advance(Phase::Creating)?;

        let identity = self
            .config
            .retry
            .execute(
                self.config.timeout_for(Operation::Create),
                &self.config.create_retry_class(),
                cancel,
                move || self.adapter.create(desired, effective),
            )
            .await
            .map_err(|e| ErrorContext::new(Operation::Create, name, None).retry(e))?;
        tracing::info!(
            kind = self.adapter.kind(),
            name = %name,
            identity = %identity,
            "Created resource"
        );

        let id = &identity;
        let ctx = ErrorContext::new(Operation::Create, name, Some(id));
        let lifecycle = self.adapter.lifecycle();
        let observed = if lifecycle.create_pending.is_empty() {
            let Some(observed) = self.read(id, name, cancel).await? else {
                return Err(ctx.wait(WaitError::NotFound { checks: 1 }));
            };
            observed
        } else {
            pass.advance(Phase::AwaitingCreateTerminal)?;
            let waiter = StateWaiter {
                pending: lifecycle.create_pending,
                target: lifecycle.create_target,
                timeout: self.config.create_timeout,
                poll_interval: self.config.poll_interval,
                not_found_checks: self.config.not_found_checks,
            };
            waiter
                .wait_for_target(cancel, move || self.observe(id))
                .await
                .map_err(|e| ctx.wait(e))?
        };

        let remote = self.read_tags(id, name, cancel).await?;
        let (tags, tags_all) = self.tag_views(remote.as_ref(), effective);
        pass.advance(Phase::Converged)?;

        Ok(Reconciled {
            identity,
            observed,
            tags,
            tags_all,
            outcome,
        })
    }

    async fn update(
        &self,
        pass: &mut Pass<'_>,
        identity: &ResourceIdentity,
        desired: &A::Desired,
        changed: &[&'static str],
        cancel: &CancellationToken,
    ) -> Result<A::Observed> {
        let name = self.adapter.name(desired);
        let ctx = ErrorContext::new(Operation::Update, name, Some(identity));

        pass.advance(Phase::Updating)?;
        self.retrying(Operation::Update, cancel, move || {
            self.adapter.update(identity, desired, changed)
        })
        .await
        .map_err(|e| ctx.retry(e))?;
        tracing::info!(
            kind = self.adapter.kind(),
            name = %name,
            identity = %identity,
            fields = ?changed,
            "Updated resource, waiting for changes to settle"
        );

        pass.advance(Phase::AwaitingFieldSettle)?;
        let settle = SettleWaiter {
            timeout: self.config.update_settle_timeout,
            poll_interval: self.config.poll_interval,
        };
        settle
            .wait(cancel, move || self.check_settle(identity, desired, changed))
            .await
            .map_err(|e| ctx.wait(e))
    }

    async fn delete_and_wait(
        &self,
        pass: &mut Pass<'_>,
        identity: &ResourceIdentity,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ctx = ErrorContext::new(Operation::Delete, name, Some(identity));

        pass.advance(Phase::Deleting)?;
        self.retrying(Operation::Delete, cancel, move || self.adapter.delete(identity))
            .await
            .map_err(|e| ctx.retry(e))?;
        tracing::info!(
            kind = self.adapter.kind(),
            identity = %identity,
            "Deletion requested, waiting for resource to disappear"
        );

        pass.advance(Phase::AwaitingDeletion)?;
        let waiter = StateWaiter {
            pending: self.adapter.lifecycle().delete_pending,
            target: &[],
            timeout: self.config.delete_timeout,
            poll_interval: self.config.poll_interval,
            not_found_checks: self.config.not_found_checks,
        };
        waiter
            .wait_for_gone(cancel, move || self.observe(identity))
            .await
            .map_err(|e| ctx.wait(e))?;

        tracing::info!(kind = self.adapter.kind(), identity = %identity, "Resource deleted");
        Ok(())
    }

    /// Read the resource; not-found reads as `None`.
    async fn read(
        &self,
        identity: &ResourceIdentity,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<A::Observed>> {
        let ctx = ErrorContext::new(Operation::Read, name, Some(identity));
        let result = self
            .retrying(Operation::Read, cancel, move || self.adapter.describe(identity))
            .await;

        match result {
            Ok(observed) => Ok(Some(observed)),
            Err(RetryError::Terminal(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(ctx.retry(e)),
        }
    }

    async fn observe(&self, identity: &ResourceIdentity) -> RemoteResult<Observation<A::Observed>> {
        match self.adapter.describe(identity).await {
            Ok(observed) => {
                let status = self.adapter.status(&observed).to_string();
                Ok(Observation::Found {
                    state: observed,
                    status,
                })
            }
            Err(e) if e.is_not_found() => Ok(Observation::Gone),
            Err(e) => Err(e),
        }
    }

    async fn check_settle(
        &self,
        identity: &ResourceIdentity,
        desired: &A::Desired,
        changed: &[&'static str],
    ) -> RemoteResult<Settle<A::Observed>> {
        let observed = self.adapter.describe(identity).await?;
        let fields: Vec<&'static str> = self
            .adapter
            .mutable_fields()
            .iter()
            .filter(|field| changed.contains(&field.name) && !field.matches(desired, &observed))
            .map(|field| field.name)
            .collect();

        Ok(if fields.is_empty() {
            Settle::Settled(observed)
        } else {
            Settle::Diverged {
                state: observed,
                fields,
            }
        })
    }

    /// List remote tags; `None` when the remote does not support tag listing.
    async fn read_tags(
        &self,
        identity: &ResourceIdentity,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TagSet>> {
        let ctx = ErrorContext::new(Operation::Tags, name, Some(identity));
        let result = self
            .retrying(Operation::Tags, cancel, move || self.adapter.list_tags(identity))
            .await;

        match result {
            Ok(tags) => Ok(Some(tags)),
            Err(RetryError::Terminal(e)) if e.is_code(codes::UNKNOWN_OPERATION) => {
                tracing::debug!(identity = %identity, "Tag listing not supported, skipping tags");
                Ok(None)
            }
            Err(e) => Err(ctx.retry(e)),
        }
    }

    /// Bring the remote tags in line with `effective`. Returns the resulting
    /// remote tags and whether anything changed.
    async fn sync_tags(
        &self,
        identity: &ResourceIdentity,
        name: &str,
        effective: &TagSet,
        cancel: &CancellationToken,
    ) -> Result<(Option<TagSet>, bool)> {
        let Some(mut remote) = self.read_tags(identity, name, cancel).await? else {
            return Ok((None, false));
        };

        let diff = self.tags.diff(&remote, effective);
        if diff.is_empty() {
            return Ok((Some(remote), false));
        }

        let ctx = ErrorContext::new(Operation::Tags, name, Some(identity));
        let diff = &diff;
        self.retrying(Operation::Tags, cancel, move || {
            self.adapter.update_tags(identity, diff)
        })
        .await
        .map_err(|e| ctx.retry(e))?;
        tracing::info!(
            kind = self.adapter.kind(),
            identity = %identity,
            set = diff.to_set.len(),
            unset = diff.to_unset.len(),
            "Updated tags"
        );

        diff.apply(&mut remote);
        Ok((Some(remote), true))
    }

    /// Run one remote call, retrying throttling and transport failures within
    /// the operation's timeout.
    async fn retrying<T, F, Fut>(
        &self,
        operation: Operation,
        cancel: &CancellationToken,
        call: F,
    ) -> std::result::Result<T, RetryError<RemoteError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        self.config
            .retry
            .execute(
                self.config.timeout_for(operation),
                &self.config.transient_errors,
                cancel,
                call,
            )
            .await
    }

    /// Resource-level and managed views of the remote tags, falling back to
    /// the effective set when the remote tags are unknown.
    fn tag_views(&self, remote: Option<&TagSet>, effective: &TagSet) -> (TagSet, TagSet) {
        match remote {
            Some(remote) => (self.tags.resource_view(remote), self.tags.managed_view(remote)),
            None => (self.tags.resource_view(effective), effective.clone()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::state_machine::StateMachineAdapter;
    use sfn_converge_core::{DesiredState, IgnoreTags};
    use sfn_converge_remote::{
        mock_identity, CallCounts, MockOperation, MockStateMachineClient, RemoteError,
        StateMachineStatus,
    };
    use std::sync::Arc;

    const ROLE: &str = "arn:aws:iam::123456789012:role/sfn";
    const D1: &str = r#"{"StartAt":"A","States":{"A":{"Type":"Pass","End":true}}}"#;

    type Subject = Reconciler<StateMachineAdapter<MockStateMachineClient>>;

    fn reconciler(policy: TagPolicy) -> (Arc<MockStateMachineClient>, Subject) {
        let remote = Arc::new(MockStateMachineClient::new());
        let reconciler = Reconciler::new(
            StateMachineAdapter::new(Arc::clone(&remote)),
            EngineConfig::default(),
            policy,
        );
        (remote, reconciler)
    }

    fn desired() -> DesiredState {
        DesiredState::new("orders", ROLE, D1)
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_desired_state_makes_no_calls() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();

        let err = reconciler
            .reconcile(&DesiredState::new("bad name", ROLE, D1), None, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(remote.calls(), CallCounts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn create_retries_transient_errors() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        for _ in 0..2 {
            remote.push_failure(
                MockOperation::Create,
                RemoteError::api(codes::ACCESS_DENIED, "role not assumable yet"),
            );
        }

        let result = reconciler.reconcile(&desired(), None, &cancel).await.unwrap();

        assert_eq!(result.outcome, Outcome::Created);
        assert_eq!(result.identity, mock_identity("orders"));
        assert_eq!(remote.calls().create, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn create_rejection_is_not_retried() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        remote.push_failure(
            MockOperation::Create,
            RemoteError::api(codes::INVALID_DEFINITION, "bad state"),
        );

        let err = reconciler.reconcile(&desired(), None, &cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RemoteRejected);
        assert_eq!(err.operation(), Some(Operation::Create));
        assert!(err.identity().is_none());
        assert_eq!(remote.calls().create, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_creating_status() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        remote.set_create_invisible_reads(2);
        remote.set_create_lag(3);

        let result = reconciler.reconcile(&desired(), None, &cancel).await.unwrap();

        assert_eq!(result.observed.status, Some(StateMachineStatus::Active));
        assert_eq!(remote.calls().describe, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn identity_survives_post_create_failure() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        remote.push_failure(
            MockOperation::Describe,
            RemoteError::api(codes::THROTTLING, "slow down"),
        );

        let err = reconciler.reconcile(&desired(), None, &cancel).await.unwrap_err();

        assert_eq!(err.identity(), Some(&mock_identity("orders")));
        assert_eq!(err.kind(), ErrorKind::TransientRemote);
        assert_eq!(remote.machine_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_resource_is_recreated() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        let first = reconciler.reconcile(&desired(), None, &cancel).await.unwrap();
        remote.remove(&first.identity);

        let second = reconciler
            .reconcile(&desired(), Some(&first.identity), &cancel)
            .await
            .unwrap();

        assert_eq!(second.outcome, Outcome::Created);
        assert_eq!(remote.calls().create, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tags_are_reconciled_after_attributes() {
        let policy = TagPolicy::new(
            TagSet::from_iter([("owner", "platform")]),
            IgnoreTags::default().with_prefix("kubernetes.io/"),
        );
        let (remote, reconciler) = reconciler(policy);
        let cancel = CancellationToken::new();

        let created = reconciler
            .reconcile(
                &desired().with_tags(TagSet::from_iter([("env", "dev")])),
                None,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(created.tags, TagSet::from_iter([("env", "dev")]));
        assert_eq!(
            created.tags_all,
            TagSet::from_iter([("env", "dev"), ("owner", "platform")])
        );

        remote.inject_tag(&created.identity, "kubernetes.io/cluster", "c1");
        remote.inject_tag(&created.identity, "aws:cloudformation:stack-name", "s");
        remote.inject_tag(&created.identity, "stray", "x");

        let updated = reconciler
            .reconcile(
                &desired().with_tags(TagSet::from_iter([("env", "prod")])),
                Some(&created.identity),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(updated.outcome, Outcome::TagsUpdated);
        assert_eq!(remote.calls().update, 0);
        let remote_tags = remote.tags(&created.identity).unwrap();
        assert_eq!(remote_tags.get("env"), Some("prod"));
        assert_eq!(remote_tags.get("stray"), None);
        assert_eq!(remote_tags.get("kubernetes.io/cluster"), Some("c1"));
        assert_eq!(remote_tags.get("aws:cloudformation:stack-name"), Some("s"));
        assert_eq!(updated.tags, TagSet::from_iter([("env", "prod")]));
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_tag_listing_is_skipped() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        let desired = desired().with_tags(TagSet::from_iter([("env", "dev")]));
        let created = reconciler.reconcile(&desired, None, &cancel).await.unwrap();
        remote.set_tagging_supported(false);

        let again = reconciler
            .reconcile(&desired, Some(&created.identity), &cancel)
            .await
            .unwrap();

        assert_eq!(again.outcome, Outcome::Unchanged);
        assert_eq!(again.tags_all, TagSet::from_iter([("env", "dev")]));
        assert_eq!(remote.calls().tag + remote.calls().untag, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn update_of_deleted_resource_is_not_found() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        let created = reconciler.reconcile(&desired(), None, &cancel).await.unwrap();
        remote.push_failure(
            MockOperation::Update,
            RemoteError::api(codes::STATE_MACHINE_DOES_NOT_EXIST, "gone"),
        );

        let err = reconciler
            .reconcile(&redefined(), Some(&created.identity), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.operation(), Some(Operation::Update));
        assert_eq!(err.identity(), Some(&created.identity));
    }

    fn redefined() -> DesiredState {
        let mut changed = desired();
        changed.definition = r#"{"StartAt":"B","States":{"B":{"Type":"Pass","End":true}}}"#.to_string();
        changed
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_update_is_retried() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        let created = reconciler.reconcile(&desired(), None, &cancel).await.unwrap();
        remote.push_failure(
            MockOperation::Update,
            RemoteError::api(codes::THROTTLING, "rate exceeded"),
        );

        let updated = reconciler
            .reconcile(&redefined(), Some(&created.identity), &cancel)
            .await
            .unwrap();

        assert!(matches!(updated.outcome, Outcome::Updated { .. }));
        assert_eq!(remote.calls().update, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_delete_is_retried() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        let created = reconciler.reconcile(&desired(), None, &cancel).await.unwrap();
        remote.push_failure(
            MockOperation::Delete,
            RemoteError::api(codes::THROTTLING, "rate exceeded"),
        );

        reconciler.destroy(&created.identity, &cancel).await.unwrap();

        assert_eq!(remote.calls().delete, 2);
        assert_eq!(remote.machine_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_on_tag_listing_is_retried() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        let desired = desired().with_tags(TagSet::from_iter([("env", "dev")]));
        let created = reconciler.reconcile(&desired, None, &cancel).await.unwrap();
        remote.push_failure(
            MockOperation::ListTags,
            RemoteError::Transport("connection reset".to_string()),
        );

        let again = reconciler
            .reconcile(&desired, Some(&created.identity), &cancel)
            .await
            .unwrap();

        assert_eq!(again.outcome, Outcome::Unchanged);
        assert_eq!(again.tags, TagSet::from_iter([("env", "dev")]));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_throttling_times_out() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();
        let created = reconciler.reconcile(&desired(), None, &cancel).await.unwrap();
        for _ in 0..64 {
            remote.push_failure(
                MockOperation::Update,
                RemoteError::api(codes::THROTTLING, "rate exceeded"),
            );
        }

        let err = reconciler
            .reconcile(&redefined(), Some(&created.identity), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.operation(), Some(Operation::Update));
        assert_eq!(err.identity(), Some(&created.identity));
        assert!(err.to_string().contains(codes::THROTTLING));
    }

    #[tokio::test(start_paused = true)]
    async fn show_reports_missing_resource_as_none() {
        let (_remote, reconciler) = reconciler(TagPolicy::default());
        let cancel = CancellationToken::new();

        let shown = reconciler
            .show(&mock_identity("missing"), &cancel)
            .await
            .unwrap();
        assert!(shown.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn show_hides_default_tags() {
        let policy = TagPolicy::new(TagSet::from_iter([("owner", "platform")]), IgnoreTags::default());
        let (_remote, reconciler) = reconciler(policy);
        let cancel = CancellationToken::new();
        let created = reconciler.reconcile(&desired(), None, &cancel).await.unwrap();

        let shown = reconciler
            .show(&created.identity, &cancel)
            .await
            .unwrap()
            .unwrap();

        assert!(shown.tags.is_empty());
        assert_eq!(shown.tags_all.get("owner"), Some("platform"));
        assert_eq!(shown.observed.name, "orders");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pass_reports_cancelled() {
        let (remote, reconciler) = reconciler(TagPolicy::default());
        remote.set_create_lag(u32::MAX);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let err = reconciler.reconcile(&desired(), None, &cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.identity(), Some(&mock_identity("orders")));
    }
}
