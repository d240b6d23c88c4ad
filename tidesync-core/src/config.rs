//! Optional daemon configuration at `~/.tidesync/config.yaml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::paths;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between delta-feed polls.
    pub poll_interval_secs: u64,
    /// Root of the directory-backed remote store. Defaults to `~/.tidesync/remote`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_root: Option<PathBuf>,
    /// Root of the per-origin local trees. Defaults to `~/.tidesync/local`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,
    /// Start with the service enabled.
    pub sync_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            remote_root: None,
            local_root: None,
            sync_enabled: true,
        }
    }
}

impl Config {
    /// Load `<home>/.tidesync/config.yaml`, or defaults if absent.
    pub fn load_at(home: &Path) -> Result<Self, StoreError> {
        let path = paths::config_path(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn remote_root_at(&self, home: &Path) -> PathBuf {
        self.remote_root
            .clone()
            .unwrap_or_else(|| paths::default_remote_root(home))
    }

    pub fn local_root_at(&self, home: &Path) -> PathBuf {
        self.local_root
            .clone()
            .unwrap_or_else(|| paths::default_local_root(home))
    }

    /// Write the config back to `<home>/.tidesync/config.yaml` atomically.
    pub fn save_at(&self, home: &Path) -> Result<(), StoreError> {
        paths::ensure_root(home)?;
        let path = paths::config_path(home);
        let tmp_path = path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, serde_yaml::to_string(self)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_is_default() {
        let home = TempDir::new().expect("tempdir");
        let config = Config::load_at(home.path()).expect("load");
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert!(config.remote_root_at(home.path()).ends_with(".tidesync/remote"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let home = TempDir::new().expect("tempdir");
        paths::ensure_root(home.path()).expect("root");
        std::fs::write(
            paths::config_path(home.path()),
            "poll_interval_secs: 5\nlocal_root: /srv/tide\n",
        )
        .expect("write");
        let config = Config::load_at(home.path()).expect("load");
        assert_eq!(config.poll_interval_secs, 5);
        assert!(config.sync_enabled);
        assert_eq!(config.local_root_at(home.path()), PathBuf::from("/srv/tide"));
    }

    #[test]
    fn saved_config_reloads() {
        let home = TempDir::new().expect("tempdir");
        let config = Config {
            sync_enabled: false,
            ..Config::default()
        };
        config.save_at(home.path()).expect("save");
        assert_eq!(Config::load_at(home.path()).expect("load"), config);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = Config {
            poll_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
