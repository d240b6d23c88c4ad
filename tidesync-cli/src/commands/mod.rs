pub mod app;
pub mod daemon;
pub mod origin;
pub mod remote;
pub mod service;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;

use tidesync_daemon::{execute_offline, send_request, DaemonError, DaemonRequest};

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Send `request` to the running daemon, or serve it in-process when no
/// daemon is running.
pub(crate) fn dispatch(home: &Path, request: DaemonRequest) -> Result<Value> {
    let response = match send_request(home, &request) {
        Ok(response) => response,
        Err(DaemonError::DaemonNotRunning { .. }) => {
            execute_offline(home, request).context("in-process sync engine failed")?
        }
        Err(err) => return Err(err).context("daemon request failed"),
    };
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(anyhow!(response
            .error
            .unwrap_or_else(|| "unknown daemon error".to_string())))
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}
