//! Request gateway: the single chokepoint for calls to the repository-hosting API.
//!
//! Every outbound request goes through [`RequestGateway::send`], which merges
//! the caller's options with the gateway defaults and coalesces identical
//! requests. Two sends with the same path and normalized query share one
//! underlying transport call and observe the same outcome.
//!
//! ## Cache scope
//!
//! Outcomes (successes and failures) are memoized for the lifetime of one
//! gateway scope. [`RequestGateway::fresh_scope`] yields a gateway that shares
//! the transport and credential but starts with an empty cache. Every
//! library operation takes its own fresh scope, so nothing is remembered
//! between operations; only direct `send` calls share a gateway's root scope.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use crate::error::RemoteError;
use crate::obs;

/// Opaque access credential supplied by the authentication collaborator.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Caller-supplied request options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RequestOptions {
    /// Query parameters, kept sorted so equal option sets compare equal.
    pub query: BTreeMap<String, String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.insert(key.to_string(), value.into());
        self
    }

    /// Options with every default not already set by `self` filled in.
    pub fn merged_with(mut self, defaults: &RequestOptions) -> RequestOptions {
        for (key, value) in &defaults.query {
            self.query
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }
}

/// A fully-normalized GET request. Also the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiRequest {
    /// Path relative to the API root, e.g. `/repos/org/name/compare/a...b`.
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl ApiRequest {
    pub fn new(path: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            path: path.into(),
            query: options.query,
        }
    }
}

impl std::fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)?;
        let mut sep = '?';
        for (key, value) in &self.query {
            write!(f, "{sep}{key}={value}")?;
            sep = '&';
        }
        Ok(())
    }
}

/// Sends a single request to the remote API.
///
/// Implement this trait to plug in the real HTTP client or test fakes.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform `request`, applying `credential` when present.
    async fn get(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<Value, RemoteError>;
}

type SharedResponse = Shared<BoxFuture<'static, Result<Arc<Value>, RemoteError>>>;

/// Counters for one gateway scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Calls that reached the transport.
    pub dispatched: u64,
    /// Sends answered by an in-flight or completed identical request.
    pub coalesced: u64,
}

#[derive(Default)]
struct RequestCache {
    entries: Mutex<HashMap<ApiRequest, SharedResponse>>,
    dispatched: AtomicU64,
    coalesced: AtomicU64,
}

/// Deduplicating gateway in front of an [`HttpTransport`].
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    credential: Option<Credential>,
    defaults: RequestOptions,
    cache: Arc<RequestCache>,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, credential: Option<Credential>) -> Self {
        Self {
            transport,
            credential,
            defaults: RequestOptions::default(),
            cache: Arc::new(RequestCache::default()),
        }
    }

    /// Options merged into every request that does not set them itself.
    pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// A gateway sharing transport, credential and defaults with an empty cache.
    pub fn fresh_scope(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            credential: self.credential.clone(),
            defaults: self.defaults.clone(),
            cache: Arc::new(RequestCache::default()),
        }
    }

    /// Send a GET for `path`, coalescing with any identical request of this scope.
    pub async fn send(&self, path: &str, options: RequestOptions) -> Result<Arc<Value>, RemoteError> {
        let request = ApiRequest::new(path, options.merged_with(&self.defaults));
        let response = {
            let mut entries = self
                .cache
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match entries.get(&request) {
                Some(existing) => {
                    self.cache.coalesced.fetch_add(1, Ordering::Relaxed);
                    obs::emit_request_coalesced(&request);
                    existing.clone()
                }
                None => {
                    self.cache.dispatched.fetch_add(1, Ordering::Relaxed);
                    let transport = Arc::clone(&self.transport);
                    let credential = self.credential.clone();
                    let key = request.clone();
                    let response = async move {
                        tracing::debug!(request = %key, "dispatching api request");
                        transport
                            .get(&key, credential.as_ref())
                            .await
                            .map(Arc::new)
                    }
                    .boxed()
                    .shared();
                    entries.insert(request, response.clone());
                    response
                }
            }
        };
        response.await
    }

    /// `true` when the credential is accepted by the API. Always asks again.
    pub async fn is_credential_valid(&self) -> bool {
        self.fresh_scope()
            .send("/user", RequestOptions::new())
            .await
            .is_ok()
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            dispatched: self.cache.dispatched.load(Ordering::Relaxed),
            coalesced: self.cache.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("credential", &self.credential)
            .field("defaults", &self.defaults)
            .field("stats", &self.stats())
            .finish()
    }
}
