//! `tidesync service enable|disable`: the global sync switch.

use anyhow::{Context, Result};
use clap::Subcommand;

use tidesync_core::Config;
use tidesync_daemon::{request_set_enabled, DaemonError};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    /// Resume remote sync.
    Enable,
    /// Stop all remote I/O; registrations are kept.
    Disable,
}

pub fn run(command: ServiceCommand) -> Result<()> {
    let home = home_dir()?;
    let enabled = matches!(command, ServiceCommand::Enable);

    let mut config = Config::load_at(&home).context("failed to load config")?;
    config.sync_enabled = enabled;
    config.save_at(&home).context("failed to save config")?;

    let word = if enabled { "enabled" } else { "disabled" };
    match request_set_enabled(&home, enabled) {
        Ok(_) => println!("sync {word}"),
        Err(DaemonError::DaemonNotRunning { .. }) => {
            println!("sync {word} (takes effect when the daemon starts)");
        }
        Err(err) => return Err(err).with_context(|| format!("failed to set sync {word}")),
    }
    Ok(())
}
