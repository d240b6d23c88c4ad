//! On-disk layout under `<home>/.tidesync/`.
//!
//! ```text
//! ~/.tidesync/
//!   config.yaml      optional daemon config
//!   metadata.yaml    origin registry backing store (mode 0600)
//!   apps.yaml        application lifecycle states
//!   remote/          default directory-backed remote store
//!   local/           default root of the per-origin local trees
//!   hashes/          per-origin synced-fingerprint stores
//! ```
//!
//! Every function takes an explicit `home`; callers outside tests obtain it
//! from [`home`].

use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const CONFIG_FILE: &str = "config.yaml";
pub const METADATA_FILE: &str = "metadata.yaml";
pub const APPS_FILE: &str = "apps.yaml";

pub fn tidesync_root(home: &Path) -> PathBuf {
    home.join(".tidesync")
}

pub fn config_path(home: &Path) -> PathBuf {
    tidesync_root(home).join(CONFIG_FILE)
}

pub fn metadata_path(home: &Path) -> PathBuf {
    tidesync_root(home).join(METADATA_FILE)
}

pub fn apps_path(home: &Path) -> PathBuf {
    tidesync_root(home).join(APPS_FILE)
}

pub fn default_remote_root(home: &Path) -> PathBuf {
    tidesync_root(home).join("remote")
}

pub fn default_local_root(home: &Path) -> PathBuf {
    tidesync_root(home).join("local")
}

pub fn hashes_dir(home: &Path) -> PathBuf {
    tidesync_root(home).join("hashes")
}

/// `dirs::home_dir()` or [`StoreError::HomeNotFound`].
pub fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

/// Create `<home>/.tidesync/` (mode `0700`) if it does not yet exist.
pub fn ensure_root(home: &Path) -> Result<PathBuf, StoreError> {
    let dir = tidesync_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn metadata_path_is_under_root() {
        let home = TempDir::new().expect("tempdir");
        assert!(metadata_path(home.path()).ends_with(".tidesync/metadata.yaml"));
    }

    #[test]
    fn ensure_root_creates_private_dir() {
        let home = TempDir::new().expect("tempdir");
        let dir = ensure_root(home.path()).expect("ensure_root");
        assert!(dir.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }
}
