//! Loading declared state and the provider tag policy.

use std::fs;
use std::path::Path;

use anyhow::Context;
use sfn_converge_core::{DesiredState, TagPolicy};

/// Read a desired state from a JSON file.
pub fn load_desired(path: &Path) -> anyhow::Result<DesiredState> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse desired state in {}", path.display()))
}

/// Build the tag policy from an optional provider file plus flag overrides.
///
/// Flags add to what the file declares; a `--default-tag` for a key the file
/// already sets wins.
pub fn load_policy(
    path: Option<&Path>,
    default_tags: &[(String, String)],
    ignore_keys: &[String],
    ignore_prefixes: &[String],
) -> anyhow::Result<TagPolicy> {
    let mut policy = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse provider settings in {}", path.display()))?
        }
        None => TagPolicy::default(),
    };

    for (key, value) in default_tags {
        policy.default_tags.insert(key.as_str(), value.as_str());
    }
    policy.ignore.keys.extend(ignore_keys.iter().cloned());
    policy.ignore.key_prefixes.extend(ignore_prefixes.iter().cloned());

    Ok(policy)
}

/// Parse a `key=value` flag. The value may be empty or contain `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfn_converge_core::StateMachineType;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn desired_accepts_inline_definition_object() {
        let file = write_file(
            r#"{
                "name": "orders",
                "role_arn": "arn:aws:iam::123456789012:role/sfn",
                "definition": {"StartAt": "A", "States": {"A": {"Type": "Pass", "End": true}}},
                "type": "EXPRESS",
                "tags": {"env": "dev"}
            }"#,
        );

        let desired = load_desired(file.path()).unwrap();
        assert_eq!(desired.name, "orders");
        assert_eq!(desired.machine_type, StateMachineType::Express);
        assert!(desired.definition.contains("\"StartAt\""));
        assert_eq!(desired.tags.get("env"), Some("dev"));
        assert!(desired.validate().is_ok());
    }

    #[test]
    fn desired_parse_error_names_the_file() {
        let file = write_file("{ not json");
        let err = load_desired(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse desired state"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_desired(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn flags_extend_provider_file() {
        let file = write_file(
            r#"{
                "default_tags": {"owner": "platform", "env": "prod"},
                "ignore": {"keys": ["managed-by"]}
            }"#,
        );

        let policy = load_policy(
            Some(file.path()),
            &[("env".to_string(), "staging".to_string())],
            &["cost-center".to_string()],
            &["kubernetes.io/".to_string()],
        )
        .unwrap();

        assert_eq!(policy.default_tags.get("env"), Some("staging"));
        assert_eq!(policy.default_tags.get("owner"), Some("platform"));
        assert!(policy.ignore.ignores("managed-by"));
        assert!(policy.ignore.ignores("cost-center"));
        assert!(policy.ignore.ignores("kubernetes.io/cluster"));
    }

    #[test]
    fn no_provider_file_means_flags_only() {
        let policy = load_policy(None, &[], &[], &[]).unwrap();
        assert_eq!(policy, TagPolicy::default());
    }

    #[test]
    fn key_value_flags() {
        assert_eq!(
            parse_key_value("team=payments"),
            Ok(("team".to_string(), "payments".to_string()))
        );
        assert_eq!(
            parse_key_value("query=a=b"),
            Ok(("query".to_string(), "a=b".to_string()))
        );
        assert_eq!(parse_key_value("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_key_value("=value").is_err());
        assert!(parse_key_value("novalue").is_err());
    }
}
