//! Directory-backed remote store.
//!
//! Stands in for a cloud drive: every object has an opaque resource id, every
//! mutation bumps one global changestamp, and deletions leave tombstones so
//! the delta feed can report them.
//!
//! ```text
//! <root>/
//!   manifest.json        entries + largest changestamp + id counter
//!   blobs/<resource_id>  file bodies (':' replaced by '_')
//! ```
//!
//! The manifest is rewritten atomically (`.tmp` + rename) on each mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use tidesync_core::types::{
    Changestamp, DeltaFeed, EntryKind, Fingerprint, RemoteEntry, ResourceId,
};

use crate::error::{remote_io_err, RemoteError};
use crate::remote::RemoteApi;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    largest_changestamp: Changestamp,
    next_id: u64,
    entries: BTreeMap<ResourceId, RemoteEntry>,
}

impl Manifest {
    fn bump(&mut self) -> Changestamp {
        self.largest_changestamp = Changestamp(self.largest_changestamp.0 + 1);
        self.largest_changestamp
    }

    fn allocate_id(&mut self, prefix: &str) -> ResourceId {
        self.next_id += 1;
        ResourceId(format!("{prefix}:{}", self.next_id))
    }

    fn live(&self, id: &ResourceId) -> Option<&RemoteEntry> {
        self.entries.get(id).filter(|e| !e.is_deleted)
    }

    fn find_child(
        &self,
        parent: Option<&ResourceId>,
        title: &str,
        kind: EntryKind,
    ) -> Option<&RemoteEntry> {
        self.entries.values().find(|e| {
            !e.is_deleted && e.kind == kind && e.title == title && e.parent_id.as_ref() == parent
        })
    }
}

/// Remote store rooted at a local directory.
#[derive(Debug)]
pub struct FsRemote {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FsRemote {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RemoteError> {
        let root = root.into();
        let blobs = root.join("blobs");
        std::fs::create_dir_all(&blobs).map_err(|e| remote_io_err(&blobs, e))?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create or overwrite the file `title` under `parent`; returns its id.
    ///
    /// Overwrites keep the resource id and only bump the changestamp.
    pub fn put_file(
        &self,
        parent: &ResourceId,
        title: &str,
        content: &[u8],
    ) -> Result<ResourceId, RemoteError> {
        self.mutate(|manifest| {
            if manifest.live(parent).is_none() {
                return Err(RemoteError::NotFound(parent.clone()));
            }
            let existing = manifest
                .find_child(Some(parent), title, EntryKind::File)
                .map(|e| e.resource_id.clone());
            let id = match existing {
                Some(id) => id,
                None => manifest.allocate_id("file"),
            };
            let blob = self.blob_path(&id);
            std::fs::write(&blob, content).map_err(|e| remote_io_err(&blob, e))?;
            let changestamp = manifest.bump();
            manifest.entries.insert(
                id.clone(),
                RemoteEntry {
                    resource_id: id.clone(),
                    title: title.to_string(),
                    is_deleted: false,
                    fingerprint: fingerprint_of(content),
                    parent_id: Some(parent.clone()),
                    kind: EntryKind::File,
                    changestamp,
                },
            );
            Ok(id)
        })
    }

    /// Tombstone a file and drop its body.
    pub fn delete_file(&self, resource_id: &ResourceId) -> Result<(), RemoteError> {
        self.mutate(|manifest| {
            let changestamp = manifest.bump();
            let entry = manifest
                .entries
                .get_mut(resource_id)
                .filter(|e| !e.is_deleted && e.kind == EntryKind::File)
                .ok_or_else(|| RemoteError::NotFound(resource_id.clone()))?;
            entry.is_deleted = true;
            entry.changestamp = changestamp;
            let blob = self.blob_path(resource_id);
            match std::fs::remove_file(&blob) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(remote_io_err(&blob, err)),
            }
        })
    }

    /// Live files directly under `parent`, sorted by title.
    pub fn files_in(&self, parent: &ResourceId) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.read(|m| {
            if m.live(parent).is_none() {
                return Err(RemoteError::NotFound(parent.clone()));
            }
            let mut files: Vec<RemoteEntry> = m
                .entries
                .values()
                .filter(|e| {
                    !e.is_deleted
                        && e.kind == EntryKind::File
                        && e.parent_id.as_ref() == Some(parent)
                })
                .cloned()
                .collect();
            files.sort_by(|a, b| a.title.cmp(&b.title));
            Ok(files)
        })
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn blob_path(&self, id: &ResourceId) -> PathBuf {
        self.root.join("blobs").join(id.0.replace([':', '/'], "_"))
    }

    fn load(&self) -> Result<Manifest, RemoteError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| remote_io_err(&path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, manifest: &Manifest) -> Result<(), RemoteError> {
        let path = self.manifest_path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&tmp, json).map_err(|e| remote_io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| remote_io_err(&path, e))?;
        Ok(())
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&Manifest) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let manifest = self.load()?;
        f(&manifest)
    }

    /// Load, mutate, save. Nothing is saved if `f` fails.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Manifest) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut manifest = self.load()?;
        let out = f(&mut manifest)?;
        self.save(&manifest)?;
        Ok(out)
    }
}

#[async_trait]
impl RemoteApi for FsRemote {
    async fn find_directory(
        &self,
        parent: Option<&ResourceId>,
        title: &str,
    ) -> Result<Option<ResourceId>, RemoteError> {
        self.read(|m| {
            Ok(m.find_child(parent, title, EntryKind::Folder)
                .map(|e| e.resource_id.clone()))
        })
    }

    async fn create_directory(
        &self,
        parent: Option<&ResourceId>,
        title: &str,
    ) -> Result<ResourceId, RemoteError> {
        self.mutate(|manifest| {
            if let Some(parent) = parent {
                if manifest.live(parent).is_none() {
                    return Err(RemoteError::NotFound(parent.clone()));
                }
            }
            let id = manifest.allocate_id("folder");
            let changestamp = manifest.bump();
            manifest.entries.insert(
                id.clone(),
                RemoteEntry {
                    resource_id: id.clone(),
                    title: title.to_string(),
                    is_deleted: false,
                    fingerprint: Fingerprint::default(),
                    parent_id: parent.cloned(),
                    kind: EntryKind::Folder,
                    changestamp,
                },
            );
            Ok(id)
        })
    }

    async fn unlink_directory(&self, directory: &ResourceId) -> Result<(), RemoteError> {
        self.mutate(|manifest| {
            let changestamp = manifest.bump();
            let entry = manifest
                .entries
                .get_mut(directory)
                .filter(|e| !e.is_deleted && e.kind == EntryKind::Folder)
                .ok_or_else(|| RemoteError::NotFound(directory.clone()))?;
            entry.is_deleted = true;
            entry.changestamp = changestamp;
            Ok(())
        })
    }

    async fn list_directory(
        &self,
        directory: &ResourceId,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.read(|m| {
            if m.live(directory).is_none() {
                return Err(RemoteError::NotFound(directory.clone()));
            }
            Ok(m.entries
                .values()
                .filter(|e| !e.is_deleted && e.parent_id.as_ref() == Some(directory))
                .cloned()
                .collect())
        })
    }

    async fn get_delta_feed(&self, since: Changestamp) -> Result<DeltaFeed, RemoteError> {
        self.read(|m| {
            let mut entries: Vec<RemoteEntry> = m
                .entries
                .values()
                .filter(|e| e.changestamp > since)
                .cloned()
                .collect();
            entries.sort_by_key(|e| e.changestamp);
            Ok(DeltaFeed {
                entries,
                largest_changestamp: m.largest_changestamp,
            })
        })
    }

    async fn download_file(&self, resource_id: &ResourceId) -> Result<Vec<u8>, RemoteError> {
        self.read(|m| {
            if m.live(resource_id).is_none() {
                return Err(RemoteError::NotFound(resource_id.clone()));
            }
            let blob = self.blob_path(resource_id);
            match std::fs::read(&blob) {
                Ok(bytes) => Ok(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(RemoteError::NotFound(resource_id.clone()))
                }
                Err(err) => Err(remote_io_err(&blob, err)),
            }
        })
    }

    async fn get_largest_changestamp(&self) -> Result<Changestamp, RemoteError> {
        self.read(|m| Ok(m.largest_changestamp))
    }
}

/// SHA-256 hex digest used as the remote content fingerprint.
pub fn fingerprint_of(content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content);
    Fingerprint(hex::encode(hasher.finalize()))
}
