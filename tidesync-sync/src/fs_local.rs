//! Filesystem local processor.
//!
//! Each origin owns the tree `<root>/<app_id>/`. Remote bodies land through
//! the atomic write protocol:
//!
//! 1. Resolve the relative path inside the origin tree (no `..`, no absolute).
//! 2. Write to `<path>.tidesync.tmp`.
//! 3. Rename to the final path (atomic on POSIX).
//! 4. Record the SHA-256 of the body in the origin's hash store.
//!
//! The hash store is what makes [`LocalFileState::Modified`] detectable.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use tidesync_core::types::{FileUrl, Origin, RemoteFileState, SyncAction, SyncDirection};

use crate::error::{local_io_err, LocalError};
use crate::hash_store;
use crate::local::{
    AppliedChange, LocalChange, LocalFileState, LocalMetadata, LocalProcessor, PreparedChange,
    RemoteContent,
};

#[derive(Debug)]
pub struct FsLocalProcessor {
    root: PathBuf,
    hashes_dir: PathBuf,
    busy: Mutex<HashSet<FileUrl>>,
    pending: Mutex<HashMap<FileUrl, Vec<LocalChange>>>,
}

impl FsLocalProcessor {
    pub fn new(root: impl Into<PathBuf>, hashes_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hashes_dir: hashes_dir.into(),
            busy: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn origin_root(&self, origin: &Origin) -> PathBuf {
        self.root.join(origin.app_id())
    }

    /// Absolute on-disk path for `url`.
    pub fn resolve(&self, url: &FileUrl) -> Result<PathBuf, LocalError> {
        let rel = url.path();
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if rel.as_os_str().is_empty() || escapes {
            return Err(LocalError::InvalidPath(rel.to_path_buf()));
        }
        Ok(self.origin_root(&url.origin).join(rel))
    }

    /// Lock `url` against remote changes (an editor holds it open).
    pub fn mark_busy(&self, url: FileUrl) {
        self.busy.lock().unwrap_or_else(|e| e.into_inner()).insert(url);
    }

    pub fn release(&self, url: &FileUrl) {
        self.busy.lock().unwrap_or_else(|e| e.into_inner()).remove(url);
    }

    /// Record a local edit that has not been pushed yet.
    pub fn record_local_change(&self, url: FileUrl, change: LocalChange) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url)
            .or_default()
            .push(change);
    }

    pub fn local_changes(&self, url: &FileUrl) -> Vec<LocalChange> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    fn is_busy(&self, url: &FileUrl) -> bool {
        self.busy.lock().unwrap_or_else(|e| e.into_inner()).contains(url)
    }

    fn hash_key(url: &FileUrl) -> String {
        url.path().to_string_lossy().replace('\\', "/")
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), LocalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| local_io_err(parent, e))?;
        }
        let tmp = PathBuf::from(format!("{}.tidesync.tmp", path.display()));
        std::fs::write(&tmp, content).map_err(|e| local_io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(local_io_err(path, e));
        }
        Ok(())
    }

    fn record_hash(&self, url: &FileUrl, digest: Option<String>) -> Result<(), LocalError> {
        let mut store = hash_store::load_in(&self.hashes_dir, &url.origin)?;
        let key = Self::hash_key(url);
        match digest {
            Some(d) => store.files.insert(key, d),
            None => store.files.remove(&key),
        };
        store.synced_at = chrono::Utc::now();
        hash_store::save_in(&self.hashes_dir, &url.origin, &store)
    }
}

#[async_trait]
impl LocalProcessor for FsLocalProcessor {
    async fn prepare_for_change(&self, url: &FileUrl) -> Result<PreparedChange, LocalError> {
        if self.is_busy(url) {
            return Ok(PreparedChange::busy());
        }
        let path = self.resolve(url)?;
        let local_changes = self.local_changes(url);
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PreparedChange {
                    local_changes,
                    ..PreparedChange::not_found()
                });
            }
            Err(e) => return Err(local_io_err(&path, e)),
        };
        let content = std::fs::read(&path).map_err(|e| local_io_err(&path, e))?;
        let store = hash_store::load_in(&self.hashes_dir, &url.origin)?;
        let state = match store.files.get(&Self::hash_key(url)) {
            Some(stored) if *stored == hash_store::digest(&content) => LocalFileState::Unmodified,
            _ => LocalFileState::Modified,
        };
        Ok(PreparedChange {
            state,
            metadata: Some(LocalMetadata {
                size: meta.len(),
                modified: meta.modified().ok(),
            }),
            local_changes,
        })
    }

    async fn clear_local_changes(&self, url: &FileUrl) -> Result<(), LocalError> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(url);
        Ok(())
    }

    async fn apply_remote_change(
        &self,
        url: &FileUrl,
        remote: &RemoteFileState,
        content: RemoteContent,
        prepared: &PreparedChange,
    ) -> Result<AppliedChange, LocalError> {
        let path = self.resolve(url)?;
        let action = match content {
            RemoteContent::File(bytes) => {
                if prepared.state == LocalFileState::Modified {
                    tracing::warn!(
                        "overwriting local edits to {url} with remote {}",
                        remote.resource_id
                    );
                }
                self.write_atomic(&path, &bytes)?;
                self.record_hash(url, Some(hash_store::digest(&bytes)))?;
                if prepared.state == LocalFileState::NotFound {
                    SyncAction::Added
                } else {
                    SyncAction::Updated
                }
            }
            RemoteContent::Delete => match std::fs::remove_file(&path) {
                Ok(()) => {
                    self.record_hash(url, None)?;
                    SyncAction::Deleted
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => SyncAction::None,
                Err(e) => return Err(local_io_err(&path, e)),
            },
        };
        tracing::info!("{action}: {}", path.display());
        Ok(AppliedChange {
            action,
            direction: SyncDirection::RemoteToLocal,
        })
    }
}
