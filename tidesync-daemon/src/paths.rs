use std::path::{Path, PathBuf};

use tidesync_core::paths::tidesync_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// Upper bound on changes applied per drain, so socket commands are not
/// starved behind a large backlog.
pub const DRAIN_BATCH: usize = 256;

pub fn socket_path(home: &Path) -> PathBuf {
    tidesync_root(home).join(DAEMON_SOCKET)
}
