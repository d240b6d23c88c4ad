use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime and its socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata store error: {0}")]
    Store(#[from] tidesync_core::StoreError),

    #[error("remote store error: {0}")]
    Remote(#[from] tidesync_sync::RemoteError),

    #[error("sync error: {0}")]
    Sync(#[from] tidesync_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
