//! Version manifest loading.
//!
//! A manifest is a YAML mapping from a structured component key to a pinned
//! version expression, stored in the manifest repository and fetched through
//! the contents endpoint at a given reference.

use serde::de::{Error as _, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_yaml::Value as YamlValue;

use crate::config::DriftConfig;
use crate::error::{DriftError, Result};
use crate::gateway::{RequestGateway, RequestOptions};

/// One `key: version` line of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: String,
    /// The mapping's value, uninterpreted.
    pub raw_version: String,
}

impl ManifestEntry {
    pub fn new(key: impl Into<String>, raw_version: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            raw_version: raw_version.into(),
        }
    }
}

/// Entries of a manifest in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub entries: Vec<ManifestEntry>,
}

impl VersionManifest {
    /// Parse manifest YAML text.
    ///
    /// An empty document is an empty manifest. Scalar values are kept as
    /// written; nested values are rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let document: YamlValue = serde_yaml::from_str(text)
            .map_err(|e| DriftError::Parse(format!("invalid manifest YAML: {e}")))?;

        let mapping = match document {
            YamlValue::Null => return Ok(Self::default()),
            YamlValue::Mapping(mapping) => mapping,
            other => {
                return Err(DriftError::Parse(format!(
                    "manifest must be a mapping, found {}",
                    yaml_kind(&other)
                )))
            }
        };

        for (key, value) in &mapping {
            if !is_scalar(key) {
                return Err(DriftError::Parse(format!(
                    "manifest key must be a scalar, found {}",
                    yaml_kind(key)
                )));
            }
            if !is_scalar(value) {
                let key = match key.as_str() {
                    Some(key) => key.to_string(),
                    None => serde_yaml::to_string(key).unwrap_or_default().trim().to_string(),
                };
                return Err(DriftError::Parse(format!(
                    "version of {key} must be a scalar, found {}",
                    yaml_kind(value)
                )));
            }
        }

        // Second pass over the same text: scalars as written, so `1.20`
        // stays `1.20` and `1234e56` is not read as a float.
        let RawEntries(entries) = serde_yaml::from_str(text)
            .map_err(|e| DriftError::Parse(format!("invalid manifest YAML: {e}")))?;
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_scalar(value: &YamlValue) -> bool {
    match value {
        YamlValue::String(_) | YamlValue::Number(_) | YamlValue::Bool(_) => true,
        YamlValue::Tagged(tagged) => is_scalar(&tagged.value),
        _ => false,
    }
}

/// Manifest entries read with every key and value taken as its source text.
struct RawEntries(Vec<ManifestEntry>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a mapping of component keys to versions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<RawEntries, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(key) = map.next_key::<String>()? {
                    let raw_version = map
                        .next_value::<String>()
                        .map_err(|e| A::Error::custom(format!("version of {key}: {e}")))?;
                    entries.push(ManifestEntry { key, raw_version });
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

fn yaml_kind(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a boolean",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a sequence",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}

/// Decode the `content` field of a contents-endpoint response.
pub fn decode_content(file: &Value) -> Result<String> {
    let content = file
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| DriftError::Parse("file response has no content".to_string()))?;
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::decode(compact)
        .map_err(|e| DriftError::Parse(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes).map_err(|e| DriftError::Parse(format!("manifest is not UTF-8: {e}")))
}

/// Fetches manifests from the manifest repository.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    gateway: RequestGateway,
    repo_path: String,
    default_path: String,
}

impl ManifestLoader {
    pub fn new(gateway: RequestGateway, config: &DriftConfig) -> Self {
        Self {
            gateway,
            repo_path: config.repo_path(&config.manifest_repo),
            default_path: config.manifest_path.clone(),
        }
    }

    /// Load the default manifest at `reference` (default branch when `None`).
    pub async fn load(&self, reference: Option<&str>) -> Result<VersionManifest> {
        self.load_path(&self.default_path, reference).await
    }

    /// Load the manifest stored at `path` at `reference`.
    pub async fn load_path(&self, path: &str, reference: Option<&str>) -> Result<VersionManifest> {
        let mut options = RequestOptions::new();
        if let Some(reference) = reference {
            options = options.with_query("ref", reference);
        }

        let file = self
            .gateway
            .send(&format!("{}/contents/{}", self.repo_path, path), options)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    DriftError::NotFound(format!(
                        "manifest {path} at {}",
                        reference.unwrap_or("default branch")
                    ))
                } else {
                    DriftError::Remote(e)
                }
            })?;

        let manifest = VersionManifest::parse(&decode_content(&file)?)?;
        tracing::debug!(
            path = %path,
            reference = reference.unwrap_or("default"),
            entries = manifest.len(),
            "loaded manifest"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeTransport;
    use serde_json::json;

    const REPO: &str = "/repos/Tradeshift/tradeshift-puppet";

    fn loader(transport: &std::sync::Arc<FakeTransport>) -> ManifestLoader {
        ManifestLoader::new(
            RequestGateway::new(transport.clone(), None),
            &DriftConfig::default(),
        )
    }

    #[test]
    fn test_parse_preserves_file_order_and_values() {
        let manifest = VersionManifest::parse(
            "role::app::zeta: 1.2.0\nrole::app::alpha: abcdef1-SNAPSHOT\nrole::app::mid: 42\n",
        )
        .unwrap();
        let keys: Vec<_> = manifest.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["role::app::zeta", "role::app::alpha", "role::app::mid"]);
        assert_eq!(manifest.get("role::app::alpha").unwrap().raw_version, "abcdef1-SNAPSHOT");
        assert_eq!(manifest.get("role::app::mid").unwrap().raw_version, "42");
    }

    #[test]
    fn test_parse_keeps_number_like_versions_as_written() {
        let manifest = VersionManifest::parse(
            "role::app::exp: 1234e56\nrole::app::ver: 1.20\nrole::app::oct: 0o17\nrole::app::flag: yes\n",
        )
        .unwrap();
        let raw: Vec<_> = manifest.entries.iter().map(|e| e.raw_version.as_str()).collect();
        assert_eq!(raw, vec!["1234e56", "1.20", "0o17", "yes"]);
        assert_eq!(crate::version::extract_commit_id(raw[0]), Some("1234e56"));
    }

    #[test]
    fn test_parse_empty_document() {
        assert!(VersionManifest::parse("").unwrap().is_empty());
        assert!(VersionManifest::parse("---\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        let err = VersionManifest::parse("- a\n- b\n").unwrap_err();
        assert!(matches!(err, DriftError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        let err = VersionManifest::parse("key: [unterminated\n").unwrap_err();
        assert!(matches!(err, DriftError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_nested_version() {
        let err = VersionManifest::parse("role::app::x:\n  nested: 1\n").unwrap_err();
        assert!(err.to_string().contains("role::app::x"));
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let file = json!({ "content": "cm9sZTo6\nYXBwOjp3\naWRnZXQ6IDEuMi4w\n" });
        assert_eq!(decode_content(&file).unwrap(), "role::app::widget: 1.2.0");
    }

    #[test]
    fn test_decode_rejects_missing_content() {
        assert!(matches!(
            decode_content(&json!({ "type": "dir" })),
            Err(DriftError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_load_at_reference() {
        let transport = FakeTransport::new();
        transport.respond_manifest(REPO, "hiera/versions.yaml", Some("feature-x"), "role::app::widget: 1.2.0\n");
        let manifest = loader(&transport).load(Some("feature-x")).await.unwrap();
        assert_eq!(manifest.entries, vec![ManifestEntry::new("role::app::widget", "1.2.0")]);
    }

    #[tokio::test]
    async fn test_load_default_branch_sends_no_ref() {
        let transport = FakeTransport::new();
        transport.respond_manifest(REPO, "hiera/versions.yaml", None, "a::b::c: abcdef1\n");
        let manifest = loader(&transport).load(None).await.unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(
            transport.calls(&format!("{REPO}/contents/hiera/versions.yaml")),
            1
        );
    }

    #[tokio::test]
    async fn test_missing_manifest_is_not_found() {
        let transport = FakeTransport::new();
        let err = loader(&transport).load(Some("nope")).await.unwrap_err();
        assert!(matches!(err, DriftError::NotFound(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_server_error_is_remote() {
        let transport = FakeTransport::new();
        transport.fail(&format!("{REPO}/contents/hiera/versions.yaml"), 502, "Bad Gateway");
        let err = loader(&transport).load(None).await.unwrap_err();
        match err {
            DriftError::Remote(remote) => assert_eq!(remote.status, Some(502)),
            other => panic!("expected remote error, got {other:?}"),
        }
    }
}
