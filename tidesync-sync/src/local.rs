//! Local processor interface: applies remote changes to on-disk state.

use std::time::SystemTime;

use async_trait::async_trait;

use tidesync_core::types::{FileUrl, RemoteFileState, SyncAction, SyncDirection};

use crate::error::LocalError;

/// What the local side knows about a path before a remote change lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFileState {
    /// Locked by a concurrent local operation.
    Busy,
    NotFound,
    Unmodified,
    /// Edited locally since the last sync.
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMetadata {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// A local edit recorded but not yet pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalChange {
    AddOrUpdate,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedChange {
    pub state: LocalFileState,
    pub metadata: Option<LocalMetadata>,
    pub local_changes: Vec<LocalChange>,
}

impl PreparedChange {
    pub fn busy() -> Self {
        Self {
            state: LocalFileState::Busy,
            metadata: None,
            local_changes: Vec::new(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            state: LocalFileState::NotFound,
            metadata: None,
            local_changes: Vec::new(),
        }
    }
}

/// Body handed to [`LocalProcessor::apply_remote_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteContent {
    File(Vec<u8>),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedChange {
    pub action: SyncAction,
    pub direction: SyncDirection,
}

#[async_trait]
pub trait LocalProcessor: Send + Sync {
    /// Inspect `url` and report its state and any pending local edits.
    async fn prepare_for_change(&self, url: &FileUrl) -> Result<PreparedChange, LocalError>;

    /// Drop the local change markers for `url`.
    async fn clear_local_changes(&self, url: &FileUrl) -> Result<(), LocalError>;

    async fn apply_remote_change(
        &self,
        url: &FileUrl,
        remote: &RemoteFileState,
        content: RemoteContent,
        prepared: &PreparedChange,
    ) -> Result<AppliedChange, LocalError>;
}
