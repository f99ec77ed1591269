//! Manifest key to repository name mapping.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DriftError, Result};

/// Delimiter between the segments of a manifest key.
pub const KEY_DELIMITER: &str = "::";

/// Index of the segment carrying the component name (`role::app::<name>`).
const NAME_SEGMENT: usize = 2;

/// Static table from a key's component segment to a repository name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameTable {
    repos: BTreeMap<String, String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: &str, repo: &str) -> Self {
        self.repos.insert(component.to_string(), repo.to_string());
        self
    }

    /// Load a JSON object of `"component": "repository"` pairs.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| DriftError::Config(format!("invalid name table: {e}")))
    }

    /// Repository name for a manifest key, or `None` when the key is not tracked.
    pub fn resolve_name(&self, key: &str) -> Option<&str> {
        let component = key.split(KEY_DELIMITER).nth(NAME_SEGMENT)?;
        self.repos.get(component).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NameTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            repos: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table() -> NameTable {
        NameTable::new()
            .with("widget", "widget-repo")
            .with("gizmo", "gizmo-repo")
    }

    #[test]
    fn test_third_segment_is_looked_up() {
        assert_eq!(table().resolve_name("role::app::widget"), Some("widget-repo"));
        assert_eq!(table().resolve_name("profile::x::gizmo"), Some("gizmo-repo"));
    }

    #[test]
    fn test_unmapped_component_is_none() {
        assert_eq!(table().resolve_name("role::app::unknown"), None);
    }

    #[test]
    fn test_short_key_is_none() {
        assert_eq!(table().resolve_name("widget"), None);
        assert_eq!(table().resolve_name("role::widget"), None);
    }

    #[test]
    fn test_only_third_segment_counts() {
        assert_eq!(table().resolve_name("widget::app::other"), None);
        assert_eq!(table().resolve_name("role::app::widget::extra"), Some("widget-repo"));
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"widget": "widget-repo", "gizmo": "gizmo-repo"}"#)
            .unwrap();
        let loaded = NameTable::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, table());
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = NameTable::from_json_str(r#"["widget"]"#).unwrap_err();
        assert!(matches!(err, DriftError::Config(_)));
    }

    #[test]
    fn test_collect_from_pairs() {
        let collected: NameTable = [("widget", "widget-repo")].into_iter().collect();
        assert_eq!(collected.resolve_name("a::b::widget"), Some("widget-repo"));
    }
}
