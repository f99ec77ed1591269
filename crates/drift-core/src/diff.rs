//! Two-commit comparison.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::DriftConfig;
use crate::error::{DriftError, Result};
use crate::gateway::{RequestGateway, RequestOptions};

fn merge_commit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^Merge pull request #\d+ from ").expect("static regex"))
}

/// The fields of a commit the engine looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    /// Account login; absent for commits by unknown users.
    pub author_login: Option<String>,
    pub author_name: String,
    pub message: String,
}

impl CommitRecord {
    /// First line of the commit message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    pub fn is_merge_commit(&self) -> bool {
        merge_commit_pattern().is_match(self.subject())
    }
}

/// `true` when `commits` is non-empty and made only of pull-request merges.
pub fn only_merge_commits(commits: &[CommitRecord]) -> bool {
    !commits.is_empty() && commits.iter().all(CommitRecord::is_merge_commit)
}

/// Normalized result of a compare request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareResult {
    pub status: String,
    pub ahead_by: u64,
    pub behind_by: u64,
    pub commits: Vec<CommitRecord>,
}

#[derive(Deserialize)]
struct WireCompare {
    #[serde(default)]
    status: String,
    ahead_by: u64,
    behind_by: u64,
    #[serde(default)]
    commits: Vec<WireCommit>,
}

#[derive(Deserialize)]
struct WireCommit {
    sha: String,
    author: Option<WireAccount>,
    commit: WireCommitDetail,
}

#[derive(Deserialize)]
struct WireAccount {
    login: Option<String>,
}

#[derive(Deserialize)]
struct WireCommitDetail {
    author: Option<WireSignature>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct WireSignature {
    #[serde(default)]
    name: String,
}

impl From<WireCommit> for CommitRecord {
    fn from(wire: WireCommit) -> Self {
        CommitRecord {
            sha: wire.sha,
            author_login: wire.author.and_then(|a| a.login),
            author_name: wire.commit.author.map(|a| a.name).unwrap_or_default(),
            message: wire.commit.message,
        }
    }
}

/// Issues compare requests for component repositories.
#[derive(Debug, Clone)]
pub struct DiffFetcher {
    gateway: RequestGateway,
    config: DriftConfig,
}

impl DiffFetcher {
    pub fn new(gateway: RequestGateway, config: &DriftConfig) -> Self {
        Self {
            gateway,
            config: config.clone(),
        }
    }

    /// Compare `from...to` in `repo`.
    ///
    /// Callers skip equal or missing refs; this method always asks the API.
    pub async fn diff(&self, repo: &str, from: &str, to: &str) -> Result<CompareResult> {
        let body = self
            .gateway
            .send(
                &format!("{}/compare/{from}...{to}", self.config.repo_path(repo)),
                RequestOptions::new(),
            )
            .await?;
        let wire = WireCompare::deserialize(&*body)
            .map_err(|e| DriftError::Parse(format!("unexpected compare response for {repo}: {e}")))?;

        Ok(CompareResult {
            status: wire.status,
            ahead_by: wire.ahead_by,
            behind_by: wire.behind_by,
            commits: wire.commits.into_iter().map(CommitRecord::from).collect(),
        })
    }
}
