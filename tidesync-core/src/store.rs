//! Durable backing for the origin registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.tidesync/metadata.yaml   (mode 0600)
//!
//! version: 1
//! sync_root: folder:abc
//! origins:
//!   app://notes/:
//!     class: incremental
//!     directory_id: folder:def
//!     last_seen: 1204
//! pending_changes:
//!   - url: { origin: app://notes/, path: todo.txt }
//!     state: { resource_id: file:12, is_deleted: false, fingerprint: 9f2c, changestamp: 1210 }
//! ```
//!
//! `pending_changes` holds remote changes that were admitted but not yet
//! applied, so a restart resumes them instead of skipping past them.
//!
//! # Write-through
//!
//! [`YamlMetadataStore`] saves the whole document on every mutation, using
//! the `.tmp` sibling + `chmod 0600` + `rename` protocol so a crash never
//! leaves a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::paths;
use crate::types::{Origin, OriginRecord, RemoteChange, ResourceId};

/// Highest document version this build understands.
pub const METADATA_VERSION: u32 = 1;

/// Persistence contract the engine writes its registry through.
///
/// Mutations must be durable when they return `Ok`.
pub trait MetadataStore: Send + Sync {
    /// Cached id of the well-known sync root directory.
    fn sync_root(&self) -> Option<ResourceId>;

    fn set_sync_root(&mut self, id: ResourceId) -> Result<(), StoreError>;

    /// Every persisted origin, sorted by origin.
    fn load_origins(&self) -> Vec<(Origin, OriginRecord)>;

    fn get_directory_id_for_origin(&self, origin: &Origin) -> Option<ResourceId>;

    /// Insert or replace the record for `origin`.
    fn set_origin_classification(
        &mut self,
        origin: &Origin,
        record: &OriginRecord,
    ) -> Result<(), StoreError>;

    fn remove_origin(&mut self, origin: &Origin) -> Result<(), StoreError>;

    /// Remote changes left unapplied by the previous run, oldest first.
    fn load_pending_changes(&self) -> Vec<RemoteChange>;

    /// Replace the persisted set of unapplied remote changes.
    fn set_pending_changes(&mut self, changes: Vec<RemoteChange>) -> Result<(), StoreError>;

    /// Force any buffered state to durable storage.
    fn flush(&mut self) -> Result<(), StoreError>;
}

/// Serialized metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_root: Option<ResourceId>,
    #[serde(default)]
    pub origins: BTreeMap<Origin, OriginRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_changes: Vec<RemoteChange>,
}

impl Default for MetadataDocument {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            sync_root: None,
            origins: BTreeMap::new(),
            pending_changes: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// 1. Load / save
// ---------------------------------------------------------------------------

/// Load the document at `path`; a missing file is an empty document.
///
/// Returns `StoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_document(path: &Path) -> Result<MetadataDocument, StoreError> {
    if !path.exists() {
        return Ok(MetadataDocument::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let doc: MetadataDocument = serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    if doc.version > METADATA_VERSION {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: doc.version,
            supported: METADATA_VERSION,
        });
    }
    Ok(doc)
}

/// Atomically save `doc` to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_document(path: &Path, doc: &MetadataDocument) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(doc)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. YAML-file store
// ---------------------------------------------------------------------------

/// Metadata store backed by `~/.tidesync/metadata.yaml`.
#[derive(Debug)]
pub struct YamlMetadataStore {
    path: PathBuf,
    doc: MetadataDocument,
}

impl YamlMetadataStore {
    /// Open (or start empty) the store under `<home>/.tidesync/`.
    pub fn open_at(home: &Path) -> Result<Self, StoreError> {
        paths::ensure_root(home)?;
        Self::open_path(paths::metadata_path(home))
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<Self, StoreError> {
        Self::open_at(&paths::home()?)
    }

    pub fn open_path(path: PathBuf) -> Result<Self, StoreError> {
        let doc = load_document(&path)?;
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &MetadataDocument {
        &self.doc
    }

    fn save(&self) -> Result<(), StoreError> {
        save_document(&self.path, &self.doc)
    }
}

impl MetadataStore for YamlMetadataStore {
    fn sync_root(&self) -> Option<ResourceId> {
        self.doc.sync_root.clone()
    }

    fn set_sync_root(&mut self, id: ResourceId) -> Result<(), StoreError> {
        self.doc.sync_root = Some(id);
        self.save()
    }

    fn load_origins(&self) -> Vec<(Origin, OriginRecord)> {
        self.doc
            .origins
            .iter()
            .map(|(o, r)| (o.clone(), r.clone()))
            .collect()
    }

    fn get_directory_id_for_origin(&self, origin: &Origin) -> Option<ResourceId> {
        self.doc
            .origins
            .get(origin)
            .and_then(|r| r.directory_id.clone())
    }

    fn set_origin_classification(
        &mut self,
        origin: &Origin,
        record: &OriginRecord,
    ) -> Result<(), StoreError> {
        self.doc.origins.insert(origin.clone(), record.clone());
        self.save()
    }

    fn remove_origin(&mut self, origin: &Origin) -> Result<(), StoreError> {
        if self.doc.origins.remove(origin).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn load_pending_changes(&self) -> Vec<RemoteChange> {
        self.doc.pending_changes.clone()
    }

    fn set_pending_changes(&mut self, changes: Vec<RemoteChange>) -> Result<(), StoreError> {
        if self.doc.pending_changes == changes {
            return Ok(());
        }
        self.doc.pending_changes = changes;
        self.save()
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.save()
    }
}

// ---------------------------------------------------------------------------
// 3. In-memory store
// ---------------------------------------------------------------------------

/// Non-durable store for tests and ephemeral runs. Counts writes.
#[derive(Debug, Default, Clone)]
pub struct MemoryMetadataStore {
    pub doc: MetadataDocument,
    pub writes: usize,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync_root(id: impl Into<ResourceId>) -> Self {
        let mut store = Self::default();
        store.doc.sync_root = Some(id.into());
        store
    }

    /// Seed an origin record without counting a write.
    pub fn seed(&mut self, origin: Origin, record: OriginRecord) {
        self.doc.origins.insert(origin, record);
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn sync_root(&self) -> Option<ResourceId> {
        self.doc.sync_root.clone()
    }

    fn set_sync_root(&mut self, id: ResourceId) -> Result<(), StoreError> {
        self.doc.sync_root = Some(id);
        self.writes += 1;
        Ok(())
    }

    fn load_origins(&self) -> Vec<(Origin, OriginRecord)> {
        self.doc
            .origins
            .iter()
            .map(|(o, r)| (o.clone(), r.clone()))
            .collect()
    }

    fn get_directory_id_for_origin(&self, origin: &Origin) -> Option<ResourceId> {
        self.doc
            .origins
            .get(origin)
            .and_then(|r| r.directory_id.clone())
    }

    fn set_origin_classification(
        &mut self,
        origin: &Origin,
        record: &OriginRecord,
    ) -> Result<(), StoreError> {
        self.doc.origins.insert(origin.clone(), record.clone());
        self.writes += 1;
        Ok(())
    }

    fn remove_origin(&mut self, origin: &Origin) -> Result<(), StoreError> {
        self.doc.origins.remove(origin);
        self.writes += 1;
        Ok(())
    }

    fn load_pending_changes(&self) -> Vec<RemoteChange> {
        self.doc.pending_changes.clone()
    }

    fn set_pending_changes(&mut self, changes: Vec<RemoteChange>) -> Result<(), StoreError> {
        if self.doc.pending_changes != changes {
            self.doc.pending_changes = changes;
            self.writes += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
