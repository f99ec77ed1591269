//! Version expression resolution.
//!
//! A manifest pins a component either to a dotted release number, resolved
//! through the `v<version>` tag of the component repository, or to a string
//! that already carries a commit id (optionally decorated, e.g. with a
//! snapshot/build suffix).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DriftConfig;
use crate::error::{DriftError, Result};
use crate::gateway::{RequestGateway, RequestOptions};

fn release_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(\.\d+)+$").expect("static regex"))
}

fn commit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9a-fA-F]{5,40}").expect("static regex"))
}

/// `true` when the whole expression is a dotted number such as `1.2.0`.
pub fn is_release_version(raw: &str) -> bool {
    release_pattern().is_match(raw)
}

/// First 5 to 40 character hexadecimal run in `raw`.
pub fn extract_commit_id(raw: &str) -> Option<&str> {
    commit_pattern().find(raw).map(|m| m.as_str())
}

/// Tag name used for a release version.
pub fn release_tag(version: &str) -> String {
    format!("v{version}")
}

/// What a tag ref points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "sha", rename_all = "snake_case")]
pub enum TagTarget {
    /// Lightweight tag: the ref names the commit directly.
    Commit(String),
    /// Annotated tag: the ref names a tag object that names the commit.
    AnnotatedTag(String),
}

impl TagTarget {
    /// Read the `object` of a tag ref response.
    pub fn from_ref(body: &Value) -> Result<Self> {
        let object = body
            .get("object")
            .ok_or_else(|| DriftError::Parse("tag ref has no object".to_string()))?;
        let sha = object_sha(object)?;
        match object.get("type").and_then(Value::as_str) {
            Some("tag") => Ok(Self::AnnotatedTag(sha)),
            _ => Ok(Self::Commit(sha)),
        }
    }
}

fn object_sha(object: &Value) -> Result<String> {
    object
        .get("sha")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriftError::Parse("git object has no sha".to_string()))
}

/// Resolves raw version expressions to commit ids.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    gateway: RequestGateway,
    config: DriftConfig,
}

impl VersionResolver {
    pub fn new(gateway: RequestGateway, config: &DriftConfig) -> Self {
        Self {
            gateway,
            config: config.clone(),
        }
    }

    /// Resolve `raw_version` of `repo` to a commit id.
    ///
    /// Release versions cost one tag lookup, plus one more for annotated
    /// tags. Anything else is answered locally.
    pub async fn resolve(&self, repo: &str, raw_version: &str) -> Result<String> {
        if is_release_version(raw_version) {
            return self.resolve_tag(repo, &release_tag(raw_version)).await;
        }
        extract_commit_id(raw_version)
            .map(str::to_string)
            .ok_or_else(|| DriftError::UnrecognizedVersion(raw_version.to_string()))
    }

    /// Commit id a tag of `repo` points at.
    pub async fn resolve_tag(&self, repo: &str, tag: &str) -> Result<String> {
        let repo_path = self.config.repo_path(repo);
        let body = self
            .gateway
            .send(&format!("{repo_path}/git/refs/tags/{tag}"), RequestOptions::new())
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    DriftError::TagNotFound {
                        tag: tag.to_string(),
                        repo: repo.to_string(),
                    }
                } else {
                    DriftError::Remote(e)
                }
            })?;

        match TagTarget::from_ref(&body)? {
            TagTarget::Commit(sha) => Ok(sha),
            TagTarget::AnnotatedTag(tag_sha) => {
                let tag_object = self
                    .gateway
                    .send(&format!("{repo_path}/git/tags/{tag_sha}"), RequestOptions::new())
                    .await?;
                let object = tag_object
                    .get("object")
                    .ok_or_else(|| DriftError::Parse(format!("tag object {tag_sha} has no target")))?;
                object_sha(object)
            }
        }
    }
}
