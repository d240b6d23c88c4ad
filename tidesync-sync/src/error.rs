//! Error types for tidesync-sync.

use std::path::PathBuf;

use thiserror::Error;

use tidesync_core::error::StoreError;
use tidesync_core::types::{FileUrl, Origin, ResourceId, ServiceState};

/// Failures reported by a [`crate::remote::RemoteApi`] implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transient network or server failure.
    #[error("remote service unavailable: {0}")]
    Unavailable(String),

    #[error("remote service requires authentication")]
    AuthenticationRequired,

    #[error("access to remote service is forbidden")]
    AccessForbidden,

    /// The resource vanished (e.g. between listing and download).
    #[error("remote resource not found: {0}")]
    NotFound(ResourceId),

    /// Storage failure inside a directory-backed remote.
    #[error("remote I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RemoteError {
    /// Service state this failure moves the engine into, if any.
    pub fn service_state(&self) -> Option<ServiceState> {
        match self {
            RemoteError::Unavailable(_) | RemoteError::Io { .. } => {
                Some(ServiceState::TemporaryUnavailable)
            }
            RemoteError::AuthenticationRequired => Some(ServiceState::AuthenticationRequired),
            RemoteError::AccessForbidden => Some(ServiceState::AccessForbidden),
            RemoteError::NotFound(_) | RemoteError::Json(_) => None,
        }
    }
}

/// Failures reported by a [`crate::local::LocalProcessor`] implementation.
#[derive(Debug, Error)]
pub enum LocalError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (hash store).
    #[error("hash store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Relative path escapes the origin tree or is absolute.
    #[error("invalid path in origin tree: {0}")]
    InvalidPath(PathBuf),
}

/// All errors surfaced by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("local error: {0}")]
    Local(#[from] LocalError),

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("origin is not registered: {0}")]
    OriginNotRegistered(Origin),

    /// The owning application is disabled; its changes are not queued.
    #[error("origin is disabled: {0}")]
    OriginDisabled(Origin),

    /// Remote I/O refused until the service returns to OK.
    #[error("remote service is {0}")]
    ServiceUnavailable(ServiceState),

    /// The apply pipeline failed for one file. Unless the failure moved the
    /// service state, the change was dropped: the path syncs again only once
    /// the remote reports a newer change or the origin is resynced.
    #[error("failed to sync {url}: {source}")]
    RemoteChange {
        url: FileUrl,
        #[source]
        source: Box<SyncError>,
    },
}

/// Convenience constructor for [`LocalError::Io`].
pub(crate) fn local_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LocalError {
    LocalError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`RemoteError::Io`].
pub(crate) fn remote_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.into(),
        source,
    }
}
