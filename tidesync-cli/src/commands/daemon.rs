//! `tidesync daemon`: foreground runtime and socket control.

use anyhow::{Context, Result};
use clap::Subcommand;

use tidesync_daemon::paths::socket_path;
use tidesync_daemon::{request_status, request_stop, start_blocking, DaemonError};

use super::{home_dir, print_json};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (engine, poll timer, socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                print_json(&serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }))?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
    }

    Ok(())
}
