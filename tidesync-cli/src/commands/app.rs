//! `tidesync app set`: record application lifecycle state in `apps.yaml`.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Subcommand;

use tidesync_sync::{AppState, FileLifecycleSource};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum AppCommand {
    /// Set an application's state: enabled, disabled or uninstalled.
    Set { app_id: String, state: AppStateArg },
}

/// Thin wrapper so clap can parse [`AppState`] from CLI args.
#[derive(Debug, Clone)]
pub struct AppStateArg(pub AppState);

impl FromStr for AppStateArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enabled" => Ok(Self(AppState::Enabled)),
            "disabled" => Ok(Self(AppState::Disabled)),
            "uninstalled" => Ok(Self(AppState::Uninstalled)),
            other => Err(format!(
                "unknown app state '{other}'; expected: enabled, disabled, uninstalled"
            )),
        }
    }
}

impl fmt::Display for AppStateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            AppState::Enabled => write!(f, "enabled"),
            AppState::Disabled => write!(f, "disabled"),
            AppState::Uninstalled => write!(f, "uninstalled"),
        }
    }
}

pub fn run(command: AppCommand) -> Result<()> {
    let home = home_dir()?;
    match command {
        AppCommand::Set { app_id, state } => {
            let source = FileLifecycleSource::at(&home);
            source
                .set_state(&app_id, state.0)
                .with_context(|| format!("failed to update {}", source.path().display()))?;
            println!("{app_id}: {state} (applied on the next sync)");
        }
    }
    Ok(())
}
