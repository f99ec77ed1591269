//! Engine configuration
//!
//! Where the version manifests live, which branch counts as mainline, and
//! how drift is reported. Values come from `DRIFT_*` environment variables
//! layered over built-in defaults, and can be overridden with the `with_*`
//! builder methods.

use serde::{Deserialize, Serialize};

use crate::error::{DriftError, Result};

/// Placeholder substituted in [`DriftConfig::environment_manifest_path`].
pub const ENVIRONMENT_PLACEHOLDER: &str = "{environment}";

/// How merge commits count toward a component's `ahead_by`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeCommitPolicy {
    /// Report `ahead_by` exactly as the compare endpoint returns it.
    #[default]
    Count,
    /// Report `ahead_by = 0` when every commit in the diff is a pull-request merge commit.
    IgnoreMergeOnly,
}

impl std::str::FromStr for MergeCommitPolicy {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(Self::Count),
            "ignore-merge-only" | "ignore_merge_only" => Ok(Self::IgnoreMergeOnly),
            other => Err(DriftError::Config(format!(
                "unknown merge commit policy: {other}"
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Base URL of the repository-hosting API
    pub api_url: String,
    /// Base URL used when rendering browsable links
    pub web_url: String,
    /// Organisation owning the manifest repository and every component repository
    pub owner: String,
    /// Repository holding the version manifests
    pub manifest_repo: String,
    /// Path of the default version manifest inside `manifest_repo`
    pub manifest_path: String,
    /// Path template for environment manifests; must contain `{environment}`
    pub environment_manifest_path: String,
    /// Mainline branch of every component repository
    pub default_branch: String,
    /// Environments compared by the matrix view, in display order
    pub environments: Vec<String>,
    /// Merge-commit handling for `ahead_by`
    pub merge_commits: MergeCommitPolicy,
    /// User agent sent with every API request
    pub user_agent: String,
}

impl Default for DriftConfig {
    fn default() -> Self {
        DriftConfig {
            api_url: "https://api.github.com".to_string(),
            web_url: "https://github.com".to_string(),
            owner: "Tradeshift".to_string(),
            manifest_repo: "tradeshift-puppet".to_string(),
            manifest_path: "hiera/versions.yaml".to_string(),
            environment_manifest_path: "hiera/environments/{environment}/versions.yaml"
                .to_string(),
            default_branch: "master".to_string(),
            environments: ["testing", "smoketest", "sandbox", "staging", "production"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            merge_commits: MergeCommitPolicy::Count,
            user_agent: format!("component-drift/{}", crate::VERSION),
        }
    }
}

impl DriftConfig {
    /// Create a config from `DRIFT_*` environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = lookup("DRIFT_API_URL") {
            config.api_url = v;
        }
        if let Some(v) = lookup("DRIFT_WEB_URL") {
            config.web_url = v;
        }
        if let Some(v) = lookup("DRIFT_OWNER") {
            config.owner = v;
        }
        if let Some(v) = lookup("DRIFT_MANIFEST_REPO") {
            config.manifest_repo = v;
        }
        if let Some(v) = lookup("DRIFT_MANIFEST_PATH") {
            config.manifest_path = v;
        }
        if let Some(v) = lookup("DRIFT_ENVIRONMENT_MANIFEST_PATH") {
            config.environment_manifest_path = v;
        }
        if let Some(v) = lookup("DRIFT_DEFAULT_BRANCH") {
            config.default_branch = v;
        }
        if let Some(v) = lookup("DRIFT_ENVIRONMENTS") {
            config.environments = split_list(&v);
        }
        if let Some(v) = lookup("DRIFT_MERGE_COMMITS") {
            config.merge_commits = v.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    pub fn with_manifest(mut self, repo: &str, path: &str) -> Self {
        self.manifest_repo = repo.to_string();
        self.manifest_path = path.to_string();
        self
    }

    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        self
    }

    pub fn with_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = environments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_merge_commits(mut self, policy: MergeCommitPolicy) -> Self {
        self.merge_commits = policy;
        self
    }

    /// Reject configurations the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("api_url", &self.api_url),
            ("owner", &self.owner),
            ("manifest_repo", &self.manifest_repo),
            ("manifest_path", &self.manifest_path),
            ("default_branch", &self.default_branch),
        ] {
            if value.trim().is_empty() {
                return Err(DriftError::Config(format!("{field} must not be empty")));
            }
        }
        if !self
            .environment_manifest_path
            .contains(ENVIRONMENT_PLACEHOLDER)
        {
            return Err(DriftError::Config(format!(
                "environment_manifest_path must contain {ENVIRONMENT_PLACEHOLDER}"
            )));
        }
        Ok(())
    }

    /// API path prefix of a repository owned by `owner`
    pub fn repo_path(&self, repo: &str) -> String {
        format!("/repos/{}/{}", self.owner, repo)
    }

    /// Manifest path for a named environment
    pub fn environment_manifest(&self, environment: &str) -> String {
        self.environment_manifest_path
            .replace(ENVIRONMENT_PLACEHOLDER, environment)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
