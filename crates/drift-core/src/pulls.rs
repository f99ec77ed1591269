//! Pull requests against the manifest repository.
//!
//! A pull request that edits version manifests is compared by aggregating
//! with its head commit as the head reference.

use serde::{Deserialize, Serialize};

use crate::aggregator::ComponentAggregator;
use crate::environments::EnvironmentMatrix;
use crate::error::{DriftError, Result};
use crate::gateway::RequestOptions;

/// Maximum number of search suggestions returned.
pub const MAX_SUGGESTIONS: usize = 10;

/// A pull request of the manifest repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub merged: bool,
    pub base_ref: String,
    pub base_sha: String,
    pub head_ref: String,
    pub head_sha: String,
    pub author_login: Option<String>,
    pub html_url: String,
}

/// A search hit, enough to offer the pull request as a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub author_login: Option<String>,
    pub avatar_url: Option<String>,
}

impl std::fmt::Display for PullRequestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.number, self.title)
    }
}

/// Drift introduced by a pull request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullRequestReport {
    /// Already merged; there is nothing left to compare.
    Merged { pull_request: PullRequest },
    Open {
        pull_request: PullRequest,
        matrix: EnvironmentMatrix,
    },
}

#[derive(Deserialize)]
struct WirePull {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    merged_at: Option<String>,
    base: WireBranch,
    head: WireBranch,
    user: Option<WireUser>,
    #[serde(default)]
    html_url: String,
}

#[derive(Deserialize)]
struct WireBranch {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

#[derive(Deserialize)]
struct WireUser {
    login: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct WireSearch {
    #[serde(default)]
    items: Vec<WireIssue>,
}

#[derive(Deserialize)]
struct WireIssue {
    number: u64,
    #[serde(default)]
    title: String,
    user: Option<WireUser>,
}

impl From<WirePull> for PullRequest {
    fn from(wire: WirePull) -> Self {
        PullRequest {
            number: wire.number,
            title: wire.title,
            state: wire.state,
            // Search-backed payloads omit `merged`; `merged_at` is always present.
            merged: wire.merged || wire.merged_at.is_some(),
            base_ref: wire.base.name,
            base_sha: wire.base.sha,
            head_ref: wire.head.name,
            head_sha: wire.head.sha,
            author_login: wire.user.and_then(|u| u.login),
            html_url: wire.html_url,
        }
    }
}

impl ComponentAggregator {
    /// Fetch pull request `number` of the manifest repository.
    pub async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let config = self.config();
        let body = self
            .gateway()
            .fresh_scope()
            .send(
                &format!("{}/pulls/{number}", config.repo_path(&config.manifest_repo)),
                RequestOptions::new(),
            )
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    DriftError::NotFound(format!("pull request #{number}"))
                } else {
                    DriftError::Remote(e)
                }
            })?;
        let wire = WirePull::deserialize(&*body)
            .map_err(|e| DriftError::Parse(format!("unexpected pull request #{number}: {e}")))?;
        Ok(wire.into())
    }

    /// Pull requests of the manifest repository matching `query`.
    pub async fn search_pull_requests(&self, query: &str) -> Result<Vec<PullRequestSummary>> {
        let config = self.config();
        let q = format!(
            "{} repo:{}/{} is:pr",
            query.trim(),
            config.owner,
            config.manifest_repo
        );
        let body = self
            .gateway()
            .fresh_scope()
            .send(
                "/search/issues",
                RequestOptions::new().with_query("q", q.trim_start()),
            )
            .await?;
        let wire = WireSearch::deserialize(&*body)
            .map_err(|e| DriftError::Parse(format!("unexpected search response: {e}")))?;

        Ok(wire
            .items
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|item| {
                let (author_login, avatar_url) = item
                    .user
                    .map(|u| (u.login, u.avatar_url))
                    .unwrap_or((None, None));
                PullRequestSummary {
                    number: item.number,
                    title: item.title,
                    author_login,
                    avatar_url,
                }
            })
            .collect())
    }

    /// Environment matrix of pull request `number`, compared at its head commit.
    pub async fn compare_pull_request(
        &self,
        number: u64,
        environments: &[String],
    ) -> Result<PullRequestReport> {
        let pull_request = self.get_pull_request(number).await?;
        if pull_request.merged {
            tracing::info!(number, "pull request is merged; nothing to compare");
            return Ok(PullRequestReport::Merged { pull_request });
        }

        let matrix = self
            .aggregate_environments(
                environments,
                &pull_request.base_sha,
                Some(&pull_request.head_sha),
            )
            .await?;
        Ok(PullRequestReport::Open {
            pull_request,
            matrix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriftConfig;
    use crate::fakes::FakeTransport;
    use crate::gateway::RequestGateway;
    use crate::names::NameTable;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const PUPPET: &str = "/repos/Tradeshift/tradeshift-puppet";

    fn aggregator(transport: &Arc<FakeTransport>) -> ComponentAggregator {
        ComponentAggregator::new(
            RequestGateway::new(transport.clone(), None),
            NameTable::new().with("gizmo", "gizmo-repo"),
            DriftConfig::default(),
        )
    }

    fn pull(number: u64, merged: bool) -> Value {
        json!({
            "number": number,
            "title": "Bump gizmo",
            "state": if merged { "closed" } else { "open" },
            "merged": merged,
            "merged_at": if merged { json!("2016-05-01T10:00:00Z") } else { Value::Null },
            "base": { "ref": "master", "sha": "base000" },
            "head": { "ref": "bump-gizmo", "sha": "head111" },
            "user": { "login": "alice", "avatar_url": "https://avatars/alice" },
            "html_url": format!("https://github.com/Tradeshift/tradeshift-puppet/pull/{number}"),
        })
    }

    #[tokio::test]
    async fn test_get_pull_request() {
        let transport = FakeTransport::new();
        transport.respond(&format!("{PUPPET}/pulls/42"), pull(42, false));
        let pr = aggregator(&transport).get_pull_request(42).await.unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.base_sha, "base000");
        assert_eq!(pr.head_sha, "head111");
        assert!(!pr.merged);
        assert_eq!(pr.author_login.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_pull_request_is_fetched_again_on_each_call() {
        let transport = FakeTransport::new();
        transport.respond(&format!("{PUPPET}/pulls/42"), pull(42, false));
        let aggregator = aggregator(&transport);
        assert!(!aggregator.get_pull_request(42).await.unwrap().merged);

        transport.respond(&format!("{PUPPET}/pulls/42"), pull(42, true));
        assert!(aggregator.get_pull_request(42).await.unwrap().merged);
        assert_eq!(transport.calls(&format!("{PUPPET}/pulls/42")), 2);
    }

    #[tokio::test]
    async fn test_unknown_pull_request_is_not_found() {
        let transport = FakeTransport::new();
        let err = aggregator(&transport).get_pull_request(7).await.unwrap_err();
        assert!(matches!(err, DriftError::NotFound(_)));
        assert!(err.to_string().contains("#7"));
    }

    #[tokio::test]
    async fn test_merged_pull_request_skips_comparison() {
        let transport = FakeTransport::new();
        transport.respond(&format!("{PUPPET}/pulls/9"), pull(9, true));
        let report = aggregator(&transport)
            .compare_pull_request(9, &["testing".to_string()])
            .await
            .unwrap();
        assert!(matches!(report, PullRequestReport::Merged { .. }));
        assert_eq!(transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_open_pull_request_compares_head_commit() {
        let transport = FakeTransport::new();
        transport.respond(&format!("{PUPPET}/pulls/5"), pull(5, false));
        let path = "hiera/environments/testing/versions.yaml";
        transport.respond_manifest(PUPPET, path, Some("base000"), "role::app::gizmo: aaaaaaa\n");
        transport.respond_manifest(PUPPET, path, Some("head111"), "role::app::gizmo: bbbbbbb\n");
        transport.respond_compare("/repos/Tradeshift/gizmo-repo", "aaaaaaa", "bbbbbbb", 3, 0, &[]);

        let report = aggregator(&transport)
            .compare_pull_request(5, &["testing".to_string()])
            .await
            .unwrap();
        let PullRequestReport::Open { matrix, .. } = report else {
            panic!("expected an open pull request report");
        };
        let cell = matrix.row("gizmo-repo").unwrap().cell("testing").unwrap();
        assert_eq!(cell.from.as_deref(), Some("aaaaaaa"));
        assert_eq!(cell.to.as_deref(), Some("bbbbbbb"));
        assert_eq!(cell.ahead_by, Some(3));
    }

    #[tokio::test]
    async fn test_search_caps_suggestions() {
        let transport = FakeTransport::new();
        let items: Vec<Value> = (1..=15)
            .map(|n| json!({ "number": n, "title": format!("PR {n}"), "user": { "login": "bob" } }))
            .collect();
        transport.respond("/search/issues", json!({ "total_count": 15, "items": items }));

        let hits = aggregator(&transport).search_pull_requests("gizmo").await.unwrap();
        assert_eq!(hits.len(), MAX_SUGGESTIONS);
        assert_eq!(hits[0].to_string(), "1 - PR 1");
        assert_eq!(
            transport.calls("/search/issues?q=gizmo repo:Tradeshift/tradeshift-puppet is:pr"),
            1
        );
    }
}
