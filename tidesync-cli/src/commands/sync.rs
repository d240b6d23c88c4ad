//! `tidesync sync`: pull pending listings and the delta feed, then apply.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tidesync_core::types::ServiceState;
use tidesync_daemon::{DaemonRequest, SyncSummary};

use super::{dispatch, home_dir, print_json};

/// Arguments for `tidesync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Emit the sync summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let data = dispatch(&home, DaemonRequest::new("sync")).context("sync failed")?;
        let summary: SyncSummary =
            serde_json::from_value(data).context("unexpected sync summary")?;
        if self.json {
            return print_json(&summary);
        }
        print_summary(&summary);
        Ok(())
    }
}

pub(crate) fn print_summary(summary: &SyncSummary) {
    let mark = if summary.failed > 0 {
        "!".yellow().bold()
    } else {
        "✓".green().bold()
    };
    println!(
        "{mark} {} queued, {} applied, {} busy, {} failed, {} pending ({} ms)",
        summary.queued,
        summary.applied,
        summary.busy,
        summary.failed,
        summary.pending,
        summary.duration_ms,
    );
    if summary.state != ServiceState::Ok {
        println!("service state: {}", summary.state.to_string().yellow());
    }
}
