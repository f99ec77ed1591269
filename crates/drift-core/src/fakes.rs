//! In-memory fake of the remote API (testing only)
//!
//! [`FakeTransport`] answers requests from a route table and records every
//! call it receives, so tests can assert how many requests actually reached
//! the "network".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::RemoteError;
use crate::gateway::{ApiRequest, Credential, HttpTransport};

/// Route-table transport.
///
/// A route matches either the full request (`/path?key=value`) or, failing
/// that, the bare path. Unrouted requests fail with 404.
#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Result<Value, RemoteError>>>,
    log: Mutex<Vec<ApiRequest>>,
    last_credential: Mutex<Option<String>>,
    latency_ms: AtomicU64,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay every response, to keep concurrent requests in flight together.
    pub fn with_latency(self: Arc<Self>, latency: Duration) -> Arc<Self> {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub fn respond(&self, route: &str, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(route.to_string(), Ok(body));
    }

    pub fn fail(&self, route: &str, status: u16, message: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(route.to_string(), Err(RemoteError::new(Some(status), message)));
    }

    /// Serve `yaml` as the base64 `contents` payload of `file` in `repo_path`.
    pub fn respond_manifest(&self, repo_path: &str, file: &str, reference: Option<&str>, yaml: &str) {
        let route = match reference {
            Some(r) => format!("{repo_path}/contents/{file}?ref={r}"),
            None => format!("{repo_path}/contents/{file}"),
        };
        // Wrapped at 60 columns like the real API.
        let encoded = base64::encode(yaml.as_bytes())
            .as_bytes()
            .chunks(60)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        self.respond(
            &route,
            json!({ "type": "file", "encoding": "base64", "content": encoded }),
        );
    }

    /// A lightweight tag ref pointing straight at a commit.
    pub fn respond_tag(&self, repo_path: &str, tag: &str, commit: &str) {
        self.respond(
            &format!("{repo_path}/git/refs/tags/{tag}"),
            json!({ "ref": format!("refs/tags/{tag}"), "object": { "type": "commit", "sha": commit } }),
        );
    }

    /// An annotated tag: ref -> tag object -> commit.
    pub fn respond_annotated_tag(&self, repo_path: &str, tag: &str, tag_object: &str, commit: &str) {
        self.respond(
            &format!("{repo_path}/git/refs/tags/{tag}"),
            json!({ "ref": format!("refs/tags/{tag}"), "object": { "type": "tag", "sha": tag_object } }),
        );
        self.respond(
            &format!("{repo_path}/git/tags/{tag_object}"),
            json!({ "tag": tag, "sha": tag_object, "object": { "type": "commit", "sha": commit } }),
        );
    }

    /// A compare result; `commits` are `(sha, login, name, message)`.
    pub fn respond_compare(
        &self,
        repo_path: &str,
        from: &str,
        to: &str,
        ahead_by: u64,
        behind_by: u64,
        commits: &[(&str, &str, &str, &str)],
    ) {
        let commits: Vec<Value> = commits
            .iter()
            .map(|(sha, login, name, message)| {
                json!({
                    "sha": sha,
                    "author": { "login": login },
                    "commit": { "author": { "name": name }, "message": message },
                })
            })
            .collect();
        let status = match (ahead_by, behind_by) {
            (0, 0) => "identical",
            (_, 0) => "ahead",
            (0, _) => "behind",
            _ => "diverged",
        };
        self.respond(
            &format!("{repo_path}/compare/{from}...{to}"),
            json!({
                "status": status,
                "ahead_by": ahead_by,
                "behind_by": behind_by,
                "total_commits": commits.len(),
                "commits": commits,
                "files": [],
            }),
        );
    }

    /// Number of received requests matching `route` (full form or bare path).
    pub fn calls(&self, route: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == route || r.to_string() == route)
            .count()
    }

    /// Number of received requests whose path starts with `prefix`.
    pub fn calls_with_prefix(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path.starts_with(prefix))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn last_credential(&self) -> Option<String> {
        self.last_credential.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<Value, RemoteError> {
        self.log.lock().unwrap().push(request.clone());
        *self.last_credential.lock().unwrap() = credential.map(|c| c.token().to_string());

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let routes = self.routes.lock().unwrap();
        routes
            .get(&request.to_string())
            .or_else(|| routes.get(&request.path))
            .cloned()
            .unwrap_or_else(|| Err(RemoteError::new(Some(404), "Not Found")))
    }
}
