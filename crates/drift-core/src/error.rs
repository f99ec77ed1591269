//! Error taxonomy for the resolution and aggregation engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure reported by the remote repository-hosting API.
///
/// `Clone` so that one coalesced request can hand the same outcome to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status, or `None` for transport-level failures.
    pub status: Option<u16>,
    /// Message taken from the response body or the transport.
    pub message: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Transport-level failure with no HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "remote request failed with status {status}: {}",
                self.message
            ),
            None => write!(f, "remote request failed: {}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum DriftError {
    /// Manifest path, tag or pull request does not exist at the requested reference.
    #[error("not found: {0}")]
    NotFound(String),

    /// Manifest content is not valid structured data.
    #[error("parse error: {0}")]
    Parse(String),

    /// Any other non-2xx or transport failure from the upstream API.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A semantic-version tag has no ref in the component repository.
    #[error("The tag \"{tag}\" for {repo} does not exist")]
    TagNotFound { tag: String, repo: String },

    /// A raw version that is neither a dotted version nor contains a commit id.
    #[error("no commit id found in version expression \"{0}\"")]
    UnrecognizedVersion(String),

    /// Invalid configuration or name table.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, DriftError>;

/// Coarse classification of a per-component failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentErrorKind {
    NotFound,
    Parse,
    Remote,
    TagNotFound,
    UnrecognizedVersion,
    Other,
}

/// A failure captured onto a single component instead of aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentError {
    pub kind: ComponentErrorKind,
    /// HTTP status when the failure came from the remote API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for ComponentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&DriftError> for ComponentError {
    fn from(err: &DriftError) -> Self {
        let (kind, status) = match err {
            DriftError::NotFound(_) => (ComponentErrorKind::NotFound, None),
            DriftError::Parse(_) => (ComponentErrorKind::Parse, None),
            DriftError::Remote(remote) => (ComponentErrorKind::Remote, remote.status),
            DriftError::TagNotFound { .. } => (ComponentErrorKind::TagNotFound, Some(404)),
            DriftError::UnrecognizedVersion(_) => (ComponentErrorKind::UnrecognizedVersion, None),
            _ => (ComponentErrorKind::Other, None),
        };
        Self {
            kind,
            status,
            message: err.to_string(),
        }
    }
}

impl From<DriftError> for ComponentError {
    fn from(err: DriftError) -> Self {
        Self::from(&err)
    }
}
