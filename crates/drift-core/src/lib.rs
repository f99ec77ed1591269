//! Component Drift Core Library
//!
//! Resolves the component versions pinned in a version manifest to commits
//! and reports how far each has drifted from a reference, across one
//! manifest, several environment manifests, or a pull request.

pub mod aggregator;
pub mod config;
pub mod diff;
pub mod environments;
pub mod error;
pub mod fakes;
pub mod gateway;
pub mod manifest;
pub mod names;
pub mod obs;
pub mod pulls;
pub mod report;
pub mod shortlog;
pub mod telemetry;
pub mod transport;
pub mod version;

pub use aggregator::{ComponentAggregator, ComponentDiff, ResolvedComponent};
pub use config::{DriftConfig, MergeCommitPolicy};
pub use diff::{CommitRecord, CompareResult, DiffFetcher};
pub use environments::{EnvironmentMatrix, MatrixRow};
pub use error::{ComponentError, ComponentErrorKind, DriftError, RemoteError, Result};
pub use gateway::{ApiRequest, Credential, GatewayStats, HttpTransport, RequestGateway, RequestOptions};
pub use manifest::{ManifestEntry, ManifestLoader, VersionManifest};
pub use names::NameTable;
pub use pulls::{PullRequest, PullRequestReport, PullRequestSummary};
pub use report::{filter_by_name, ComponentStatus};
pub use shortlog::shortlog;
pub use transport::ReqwestTransport;
pub use version::{TagTarget, VersionResolver};

/// Crate version, used in the default user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
