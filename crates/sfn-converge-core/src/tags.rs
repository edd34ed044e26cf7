//! Tag sets and the layered default/ignore tag policy.
//!
//! Tags come from three layers:
//!
//! - **default** tags, configured once for every resource the engine manages
//! - **resource** tags, declared per resource
//! - **ignore** rules (exact keys or key prefixes), outside the engine's scope
//!
//! The effective set written to the remote is `(default ∪ resource) \ ignored`,
//! with resource values overriding default values on key collision. Ignored keys
//! are never added, changed or removed. Keys under the reserved `aws:` prefix
//! are always ignored.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Key prefix reserved for tags managed by the remote platform itself.
pub const SYSTEM_TAG_PREFIX: &str = "aws:";

/// A mapping from tag key to tag value with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    /// Create an empty tag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a tag, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Look up the value of a tag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Keep only the tags for which `keep` returns true.
    #[must_use]
    pub fn filtered(&self, mut keep: impl FnMut(&str, &str) -> bool) -> Self {
        self.iter()
            .filter(|(k, v)| keep(k, v))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for TagSet {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for TagSet {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Tag keys and key prefixes excluded from the engine's management scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreTags {
    /// Exact keys to ignore.
    #[serde(default)]
    pub keys: BTreeSet<String>,
    /// Key prefixes to ignore.
    #[serde(default)]
    pub key_prefixes: Vec<String>,
}

impl IgnoreTags {
    /// Ignore the given exact keys.
    #[must_use]
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            key_prefixes: Vec::new(),
        }
    }

    /// Add an exact key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    /// Add a key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefixes.push(prefix.into());
        self
    }

    /// Check whether a key falls outside the management scope.
    #[must_use]
    pub fn ignores(&self, key: &str) -> bool {
        key.starts_with(SYSTEM_TAG_PREFIX)
            || self.keys.contains(key)
            || self.key_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

/// The minimal change that brings a remote tag set to the effective set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagDiff {
    /// Tags to add or overwrite.
    pub to_set: TagSet,
    /// Keys to remove.
    pub to_unset: BTreeSet<String>,
}

impl TagDiff {
    /// True when nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_set.is_empty() && self.to_unset.is_empty()
    }

    /// Apply the diff to a tag set, removals first.
    pub fn apply(&self, tags: &mut TagSet) {
        for key in &self.to_unset {
            tags.remove(key);
        }
        tags.extend(self.to_set.iter());
    }
}

/// Default tags plus ignore rules, passed explicitly to whoever needs them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPolicy {
    /// Tags applied to every managed resource.
    #[serde(default)]
    pub default_tags: TagSet,
    /// Tags the engine must leave alone.
    #[serde(default)]
    pub ignore: IgnoreTags,
}

impl TagPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(default_tags: TagSet, ignore: IgnoreTags) -> Self {
        Self {
            default_tags,
            ignore,
        }
    }

    /// Compute `(default ∪ resource) \ ignored`; resource values win.
    #[must_use]
    pub fn effective(&self, resource: &TagSet) -> TagSet {
        let mut merged = self.default_tags.clone();
        merged.extend(resource.iter());
        merged.filtered(|k, _| !self.ignore.ignores(k))
    }

    /// Compute the changes needed to turn `remote` into `effective`.
    ///
    /// Ignored keys appear in neither half of the diff, whatever their state on
    /// either side.
    #[must_use]
    pub fn diff(&self, remote: &TagSet, effective: &TagSet) -> TagDiff {
        let to_set = effective.filtered(|k, v| !self.ignore.ignores(k) && remote.get(k) != Some(v));
        let to_unset = remote
            .keys()
            .filter(|k| !self.ignore.ignores(k) && !effective.contains_key(k))
            .map(str::to_string)
            .collect();

        TagDiff { to_set, to_unset }
    }

    /// The part of a remote tag set the engine manages (`tags_all`).
    #[must_use]
    pub fn managed_view(&self, remote: &TagSet) -> TagSet {
        remote.filtered(|k, _| !self.ignore.ignores(k))
    }

    /// The resource-level view of a remote tag set.
    ///
    /// Default tags are injected rather than declared, so a remote tag equal to
    /// a default tag is hidden. A remote value that differs from the default is
    /// a resource-level override and stays visible.
    #[must_use]
    pub fn resource_view(&self, remote: &TagSet) -> TagSet {
        self.managed_view(remote)
            .filtered(|k, v| self.default_tags.get(k) != Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags<const N: usize>(pairs: [(&str, &str); N]) -> TagSet {
        TagSet::from_iter(pairs)
    }

    #[test]
    fn effective_resource_overrides_default_and_drops_ignored() {
        let policy = TagPolicy::new(tags([("env", "prod")]), IgnoreTags::from_keys(["team"]));
        let effective = policy.effective(&tags([("env", "dev"), ("team", "x")]));
        assert_eq!(effective, tags([("env", "dev")]));
    }

    #[test]
    fn effective_merges_disjoint_layers() {
        let policy = TagPolicy::new(tags([("owner", "ops")]), IgnoreTags::default());
        let effective = policy.effective(&tags([("app", "orders")]));
        assert_eq!(effective, tags([("app", "orders"), ("owner", "ops")]));
    }

    #[test]
    fn ignore_prefixes_and_system_tags() {
        let ignore = IgnoreTags::default().with_prefix("kubernetes.io/");
        assert!(ignore.ignores("kubernetes.io/cluster"));
        assert!(ignore.ignores("aws:cloudformation:stack-name"));
        assert!(!ignore.ignores("kubernetes"));

        let policy = TagPolicy::new(TagSet::new(), ignore);
        let effective = policy.effective(&tags([
            ("kubernetes.io/role", "x"),
            ("aws:createdBy", "y"),
            ("app", "orders"),
        ]));
        assert_eq!(effective, tags([("app", "orders")]));
    }

    #[test]
    fn diff_sets_changes_and_unsets_extras() {
        let policy = TagPolicy::default();
        let remote = tags([("a", "1"), ("b", "2"), ("c", "3")]);
        let effective = tags([("a", "1"), ("b", "20"), ("d", "4")]);

        let diff = policy.diff(&remote, &effective);
        assert_eq!(diff.to_set, tags([("b", "20"), ("d", "4")]));
        assert_eq!(diff.to_unset, BTreeSet::from(["c".to_string()]));
    }

    #[test]
    fn diff_never_touches_ignored_keys() {
        let policy = TagPolicy::new(TagSet::new(), IgnoreTags::from_keys(["owner"]));
        let remote = tags([("owner", "someone"), ("aws:stack", "s")]);
        let effective = TagSet::new();

        assert!(policy.diff(&remote, &effective).is_empty());
    }

    #[test]
    fn diff_is_idempotent_after_apply() {
        let policy = TagPolicy::new(
            tags([("env", "prod"), ("cost", "shared")]),
            IgnoreTags::from_keys(["owner"]).with_prefix("tmp-"),
        );
        let cases = [
            (tags([("env", "old"), ("stale", "x"), ("owner", "o")]), tags([("team", "a")])),
            (TagSet::new(), TagSet::new()),
            (tags([("tmp-1", "x"), ("cost", "shared")]), tags([("env", "dev"), ("tmp-2", "y")])),
        ];

        for (mut remote, resource) in cases {
            let effective = policy.effective(&resource);
            let diff = policy.diff(&remote, &effective);
            diff.apply(&mut remote);

            assert!(policy.diff(&remote, &effective).is_empty(), "remote: {remote:?}");
            assert_eq!(policy.managed_view(&remote), effective);
        }
    }

    #[test]
    fn resource_view_hides_matching_defaults_only() {
        let policy = TagPolicy::new(
            tags([("env", "prod"), ("owner", "ops")]),
            IgnoreTags::from_keys(["ignored"]),
        );
        let remote = tags([
            ("env", "prod"),
            ("owner", "payments"),
            ("app", "orders"),
            ("ignored", "z"),
        ]);

        assert_eq!(
            policy.resource_view(&remote),
            tags([("owner", "payments"), ("app", "orders")])
        );
        assert_eq!(
            policy.managed_view(&remote),
            tags([("env", "prod"), ("owner", "payments"), ("app", "orders")])
        );
    }

    #[test]
    fn tag_set_serde_is_a_plain_map() {
        let set = tags([("b", "2"), ("a", "1")]);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"{"a":"1","b":"2"}"#);

        let policy: TagPolicy = serde_json::from_str(
            r#"{"default_tags":{"env":"prod"},"ignore":{"key_prefixes":["tmp-"]}}"#,
        )
        .unwrap();
        assert_eq!(policy.default_tags, tags([("env", "prod")]));
        assert!(policy.ignore.ignores("tmp-x"));
    }
}
