//! Domain types for the tidesync engine.
//!
//! Identifiers coming from the remote store are opaque strings wrapped in
//! newtypes; relative file paths inside an origin use `PathBuf`.
//! All persisted types are serializable via serde.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An application identity whose file tree is synchronized, e.g. `app://notes/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(pub String);

impl Origin {
    /// Origin for an application id, using the `app://<id>/` form.
    pub fn for_app(app_id: &str) -> Self {
        Self(format!("app://{app_id}/"))
    }

    /// The application identity encoded in the origin (host part of the URI).
    ///
    /// Identifiers without a scheme are treated as bare ids.
    pub fn app_id(&self) -> &str {
        let rest = match self.0.split_once("://") {
            Some((_, rest)) => rest,
            None => self.0.as_str(),
        };
        rest.split('/').next().unwrap_or(rest)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Origin {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Origin {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque identifier of a remote object (file or directory).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Content fingerprint reported by the remote store (an MD5 or SHA digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Position in the remote change feed. Monotonically increasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Changestamp(pub i64);

impl fmt::Display for Changestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for Changestamp {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

// ---------------------------------------------------------------------------
// File addressing
// ---------------------------------------------------------------------------

/// A file inside an origin's tree: `(origin, relative path)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileUrl {
    pub origin: Origin,
    pub path: PathBuf,
}

impl FileUrl {
    pub fn new(origin: Origin, path: impl Into<PathBuf>) -> Self {
        Self {
            origin,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = self.origin.0.trim_end_matches('/');
        write!(f, "{origin}/{}", self.path.display())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Classification of a registered origin. An origin holds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginClass {
    /// Waiting for an initial full listing.
    PendingBatch,
    /// Kept current through the delta feed.
    Incremental,
    /// The owning application is disabled; nothing is synced.
    Disabled,
}

impl fmt::Display for OriginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginClass::PendingBatch => write!(f, "pending-batch"),
            OriginClass::Incremental => write!(f, "incremental"),
            OriginClass::Disabled => write!(f, "disabled"),
        }
    }
}

/// Overall availability of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
    Ok,
    TemporaryUnavailable,
    Disabled,
    AuthenticationRequired,
    AccessForbidden,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Ok => write!(f, "ok"),
            ServiceState::TemporaryUnavailable => write!(f, "temporary-unavailable"),
            ServiceState::Disabled => write!(f, "disabled"),
            ServiceState::AuthenticationRequired => write!(f, "authentication-required"),
            ServiceState::AccessForbidden => write!(f, "access-forbidden"),
        }
    }
}

/// Terminal status of one `process_next_remote_change` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Ok,
    NoChangeToSync,
    /// The local path is locked by a concurrent local operation; retry later.
    FileBusy,
}

/// What the local processor did to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    #[default]
    None,
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::None => write!(f, "none"),
            SyncAction::Added => write!(f, "added"),
            SyncAction::Updated => write!(f, "updated"),
            SyncAction::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    #[default]
    None,
    LocalToRemote,
    RemoteToLocal,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::None => write!(f, "none"),
            SyncDirection::LocalToRemote => write!(f, "local-to-remote"),
            SyncDirection::RemoteToLocal => write!(f, "remote-to-local"),
        }
    }
}

/// Per-file synchronization status reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Unknown,
    Synced,
    Conflicting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    Folder,
}

// ---------------------------------------------------------------------------
// Remote data
// ---------------------------------------------------------------------------

/// One already-parsed entry from a directory listing or the delta feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub resource_id: ResourceId,
    /// File name; the path relative to the origin directory.
    pub title: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub fingerprint: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ResourceId>,
    #[serde(default)]
    pub kind: EntryKind,
    /// Changestamp at which this entry last changed.
    #[serde(default)]
    pub changestamp: Changestamp,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Result of a delta-feed fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaFeed {
    pub entries: Vec<RemoteEntry>,
    /// Feed position up to which `entries` is complete.
    pub largest_changestamp: Changestamp,
}

/// Latest known remote state of one file, as held in the change queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileState {
    pub resource_id: ResourceId,
    pub is_deleted: bool,
    pub fingerprint: Fingerprint,
    pub changestamp: Changestamp,
}

/// A queued remote change handed to the apply pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub url: FileUrl,
    pub state: RemoteFileState,
}

// ---------------------------------------------------------------------------
// Persisted origin metadata
// ---------------------------------------------------------------------------

/// Persisted view of a registered origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRecord {
    pub class: OriginClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_id: Option<ResourceId>,
    /// Watermark for incremental origins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Changestamp>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OriginRecord {
    pub fn pending(directory_id: Option<ResourceId>) -> Self {
        let now = Utc::now();
        Self {
            class: OriginClass::PendingBatch,
            directory_id,
            last_seen: None,
            registered_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
