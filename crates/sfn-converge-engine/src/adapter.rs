//! The capability interface a resource kind provides to the reconciler.
//!
//! The [`Reconciler`](crate::Reconciler) is generic over [`ResourceAdapter`]:
//! an adapter wraps one kind's remote calls and describes its fields with
//! equality predicates, and the reconciler drives create, update, settle,
//! replacement, tagging and deletion from that description.

use async_trait::async_trait;
use sfn_converge_core::{CoreError, ResourceIdentity, TagDiff, TagSet};
use sfn_converge_remote::Result as RemoteResult;

/// A named field with a predicate deciding whether the observed value
/// satisfies the desired one.
pub struct Field<D, O> {
    /// Field name, as reported in diffs and errors.
    pub name: &'static str,
    /// Returns true when `observed` satisfies `desired` for this field.
    pub equal: fn(&D, &O) -> bool,
}

impl<D, O> Field<D, O> {
    /// Check whether this field matches.
    #[must_use]
    pub fn matches(&self, desired: &D, observed: &O) -> bool {
        (self.equal)(desired, observed)
    }
}

impl<D, O> Clone for Field<D, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D, O> Copy for Field<D, O> {}

impl<D, O> std::fmt::Debug for Field<D, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

/// Names of the fields in `fields` that do not match.
#[must_use]
pub fn diverged<D, O>(fields: &[Field<D, O>], desired: &D, observed: &O) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|field| !field.matches(desired, observed))
        .map(|field| field.name)
        .collect()
}

/// Status labels that drive the create and delete waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    /// Statuses a new resource passes through. Empty means creation is
    /// synchronous and no wait happens.
    pub create_pending: &'static [&'static str],
    /// Statuses that complete creation.
    pub create_target: &'static [&'static str],
    /// Statuses a deleted resource may report before it disappears.
    pub delete_pending: &'static [&'static str],
}

/// Operations and field descriptions of one resource kind.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// The declared attribute set.
    type Desired: Send + Sync;
    /// The remote-observed snapshot.
    type Observed: Send + Sync;

    /// Human-readable kind, used in logs.
    fn kind(&self) -> &'static str;

    /// The resource name declared in `desired`.
    fn name<'a>(&self, desired: &'a Self::Desired) -> &'a str;

    /// The resource-level tags declared in `desired`.
    fn tags<'a>(&self, desired: &'a Self::Desired) -> &'a TagSet;

    /// Validate `desired` before any remote call.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    fn validate(&self, desired: &Self::Desired) -> Result<(), CoreError>;

    /// Create the resource with the given effective tags.
    async fn create(&self, desired: &Self::Desired, tags: &TagSet) -> RemoteResult<ResourceIdentity>;

    /// Read the resource.
    async fn describe(&self, identity: &ResourceIdentity) -> RemoteResult<Self::Observed>;

    /// Update the mutable fields named in `changed`.
    async fn update(
        &self,
        identity: &ResourceIdentity,
        desired: &Self::Desired,
        changed: &[&'static str],
    ) -> RemoteResult<()>;

    /// Request deletion.
    async fn delete(&self, identity: &ResourceIdentity) -> RemoteResult<()>;

    /// List the remote tags.
    async fn list_tags(&self, identity: &ResourceIdentity) -> RemoteResult<TagSet>;

    /// Apply a tag diff.
    async fn update_tags(&self, identity: &ResourceIdentity, diff: &TagDiff) -> RemoteResult<()>;

    /// Status label of an observed resource.
    fn status<'a>(&self, observed: &'a Self::Observed) -> &'a str;

    /// Fields that can be updated in place.
    fn mutable_fields(&self) -> &[Field<Self::Desired, Self::Observed>];

    /// Fields whose change requires replacing the resource.
    fn immutable_fields(&self) -> &[Field<Self::Desired, Self::Observed>];

    /// Status labels for the create and delete waits.
    fn lifecycle(&self) -> Lifecycle;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Desired {
        a: u32,
        b: &'static str,
    }

    fn a_equal(desired: &Desired, observed: &Desired) -> bool {
        desired.a == observed.a
    }

    fn b_equal(desired: &Desired, observed: &Desired) -> bool {
        desired.b.eq_ignore_ascii_case(observed.b)
    }

    const FIELDS: &[Field<Desired, Desired>] = &[
        Field {
            name: "a",
            equal: a_equal,
        },
        Field {
            name: "b",
            equal: b_equal,
        },
    ];

    #[test]
    fn diverged_lists_failing_predicates() {
        let desired = Desired { a: 1, b: "x" };

        assert!(diverged(FIELDS, &desired, &Desired { a: 1, b: "X" }).is_empty());
        assert_eq!(diverged(FIELDS, &desired, &Desired { a: 2, b: "x" }), vec!["a"]);
        assert_eq!(
            diverged(FIELDS, &desired, &Desired { a: 2, b: "y" }),
            vec!["a", "b"]
        );
    }

    #[test]
    fn field_debug_shows_name() {
        assert_eq!(format!("{:?}", FIELDS[0]), "Field { name: \"a\" }");
    }
}
