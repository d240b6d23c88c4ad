//! Application lifecycle source.
//!
//! The file-backed source reads `~/.tidesync/apps.yaml`:
//!
//! ```yaml
//! notes: enabled
//! music: disabled
//! old-game: uninstalled
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tidesync_core::error::StoreError;
use tidesync_core::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Enabled,
    Disabled,
    Uninstalled,
}

/// Enabled / disabled / uninstalled application ids at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub enabled: BTreeSet<String>,
    pub disabled: BTreeSet<String>,
    pub uninstalled: BTreeSet<String>,
}

impl LifecycleSnapshot {
    /// State of `app_id`. An id listed in several sets resolves to the most
    /// restrictive one.
    pub fn state_of(&self, app_id: &str) -> Option<AppState> {
        if self.uninstalled.contains(app_id) {
            Some(AppState::Uninstalled)
        } else if self.disabled.contains(app_id) {
            Some(AppState::Disabled)
        } else if self.enabled.contains(app_id) {
            Some(AppState::Enabled)
        } else {
            None
        }
    }

    pub fn insert(&mut self, app_id: impl Into<String>, state: AppState) {
        let app_id = app_id.into();
        match state {
            AppState::Enabled => self.enabled.insert(app_id),
            AppState::Disabled => self.disabled.insert(app_id),
            AppState::Uninstalled => self.uninstalled.insert(app_id),
        };
    }
}

impl FromIterator<(String, AppState)> for LifecycleSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, AppState)>>(iter: I) -> Self {
        let mut snapshot = Self::default();
        for (id, state) in iter {
            snapshot.insert(id, state);
        }
        snapshot
    }
}

/// Polled source of application lifecycle state.
pub trait LifecycleSource: Send + Sync {
    fn snapshot(&self) -> Result<LifecycleSnapshot, StoreError>;
}

#[derive(Debug, Clone)]
pub struct FileLifecycleSource {
    path: PathBuf,
}

impl FileLifecycleSource {
    pub fn at(home: &Path) -> Self {
        Self {
            path: paths::apps_path(home),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `state` for `app_id`, keeping every other entry.
    pub fn set_state(&self, app_id: &str, state: AppState) -> Result<(), StoreError> {
        let mut apps = self.read_map()?;
        apps.insert(app_id.to_string(), state);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, serde_yaml::to_string(&apps)?)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn read_map(&self) -> Result<BTreeMap<String, AppState>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let apps: Option<BTreeMap<String, AppState>> =
            serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse {
                path: self.path.clone(),
                source: e,
            })?;
        Ok(apps.unwrap_or_default())
    }
}

impl LifecycleSource for FileLifecycleSource {
    /// A missing file is an empty snapshot.
    fn snapshot(&self) -> Result<LifecycleSnapshot, StoreError> {
        Ok(self.read_map()?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_snapshot() {
        let home = TempDir::new().unwrap();
        let snapshot = FileLifecycleSource::at(home.path()).snapshot().unwrap();
        assert_eq!(snapshot, LifecycleSnapshot::default());
    }

    #[test]
    fn parses_app_states() {
        let home = TempDir::new().unwrap();
        paths::ensure_root(home.path()).unwrap();
        std::fs::write(
            paths::apps_path(home.path()),
            "notes: enabled\nmusic: disabled\nold-game: uninstalled\n",
        )
        .unwrap();
        let snapshot = FileLifecycleSource::at(home.path()).snapshot().unwrap();
        assert_eq!(snapshot.state_of("notes"), Some(AppState::Enabled));
        assert_eq!(snapshot.state_of("music"), Some(AppState::Disabled));
        assert_eq!(snapshot.state_of("old-game"), Some(AppState::Uninstalled));
        assert_eq!(snapshot.state_of("unknown"), None);
    }

    #[test]
    fn empty_file_is_empty_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("apps.yaml");
        std::fs::write(&path, "").unwrap();
        let snapshot = FileLifecycleSource::from_path(&path).snapshot().unwrap();
        assert!(snapshot.enabled.is_empty());
    }

    #[test]
    fn bad_state_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("apps.yaml");
        std::fs::write(&path, "notes: sleeping\n").unwrap();
        let err = FileLifecycleSource::from_path(&path).snapshot().unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
    }

    #[test]
    fn most_restrictive_state_wins() {
        let mut snapshot = LifecycleSnapshot::default();
        snapshot.insert("notes", AppState::Enabled);
        snapshot.insert("notes", AppState::Disabled);
        assert_eq!(snapshot.state_of("notes"), Some(AppState::Disabled));
    }

    #[test]
    fn set_state_updates_one_entry() {
        let home = TempDir::new().unwrap();
        let source = FileLifecycleSource::at(home.path());
        source.set_state("notes", AppState::Enabled).unwrap();
        source.set_state("music", AppState::Disabled).unwrap();
        source.set_state("notes", AppState::Uninstalled).unwrap();

        let snapshot = source.snapshot().unwrap();
        assert_eq!(snapshot.state_of("notes"), Some(AppState::Uninstalled));
        assert_eq!(snapshot.state_of("music"), Some(AppState::Disabled));
        assert!(snapshot.enabled.is_empty());
    }
}
