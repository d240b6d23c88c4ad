//! Hash store: SHA-256 digests of files as last written by a remote sync.
//!
//! One JSON document per origin at `<hashes_dir>/<app_id>.json`. A local file
//! whose digest no longer matches its entry has been edited since the sync.
//! Writes use the same atomic `.tmp` + rename pattern as the metadata store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use tidesync_core::types::Origin;

use crate::error::{local_io_err, LocalError};

/// Relative path (as a `/`-joined string) → SHA-256 hex digest.
pub type HashStore = HashMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashStoreFile {
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub files: HashStore,
}

impl Default for HashStoreFile {
    fn default() -> Self {
        Self {
            synced_at: Utc::now(),
            files: HashMap::new(),
        }
    }
}

pub fn store_path_in(dir: &Path, origin: &Origin) -> PathBuf {
    dir.join(format!("{}.json", origin.app_id()))
}

/// Load the store for `origin`; empty if the file does not yet exist.
pub fn load_in(dir: &Path, origin: &Origin) -> Result<HashStoreFile, LocalError> {
    let path = store_path_in(dir, origin);
    if !path.exists() {
        return Ok(HashStoreFile::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| local_io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn save_in(dir: &Path, origin: &Origin, store: &HashStoreFile) -> Result<(), LocalError> {
    std::fs::create_dir_all(dir).map_err(|e| local_io_err(dir, e))?;
    let path = store_path_in(dir, origin);
    let json = serde_json::to_string_pretty(store)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| local_io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| local_io_err(&path, e))?;
    Ok(())
}

pub fn digest(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    hex::encode(h.finalize())
}
