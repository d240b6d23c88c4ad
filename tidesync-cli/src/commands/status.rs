//! `tidesync status`: service state, queue depth and registered origins.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use tidesync_core::types::{OriginClass, ServiceState};
use tidesync_core::Config;
use tidesync_daemon::events::EventStats;
use tidesync_daemon::{request_status, DaemonError, StatusPayload};
use tidesync_sync::OriginStatus;

use super::origin::{load_origins, print_table};
use super::{home_dir, print_json};

/// Arguments for `tidesync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// What `status` reports, whether or not the daemon is up.
#[derive(Debug, Serialize)]
struct StatusReport {
    daemon_running: bool,
    sync_enabled: bool,
    state: Option<ServiceState>,
    pending_changes: Option<usize>,
    origins: Vec<OriginStatus>,
    stats: Option<EventStats>,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let config = Config::load_at(&home).context("failed to load config")?;

        let report = match request_status(&home) {
            Ok(payload) => from_daemon(payload),
            Err(DaemonError::DaemonNotRunning { .. }) => StatusReport {
                daemon_running: false,
                sync_enabled: config.sync_enabled,
                state: None,
                pending_changes: None,
                origins: load_origins(&home)?,
                stats: None,
            },
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            return print_json(&report);
        }
        print_report(report);
        Ok(())
    }
}

fn from_daemon(payload: StatusPayload) -> StatusReport {
    StatusReport {
        daemon_running: payload.running,
        sync_enabled: payload.service.state != ServiceState::Disabled,
        state: Some(payload.service.state),
        pending_changes: Some(payload.service.pending_changes),
        origins: payload.service.origins,
        stats: Some(payload.stats),
    }
}

fn print_report(report: StatusReport) {
    let incremental = count(&report.origins, OriginClass::Incremental);
    let pending = count(&report.origins, OriginClass::PendingBatch);
    let disabled = count(&report.origins, OriginClass::Disabled);

    let daemon = if report.daemon_running {
        "running".green().bold()
    } else {
        "stopped".bright_black().bold()
    };
    let state = match report.state {
        Some(state) => state_label(state),
        None if report.sync_enabled => "enabled".normal().to_string(),
        None => "disabled".yellow().to_string(),
    };
    let breakdown =
        format!("{incremental} incremental, {pending} pending-batch, {disabled} disabled");
    println!(
        "tidesync v{} | daemon {daemon} | service {state} | {} origins ({breakdown})",
        env!("CARGO_PKG_VERSION"),
        report.origins.len(),
    );
    if let Some(queued) = report.pending_changes {
        println!("queued remote changes: {queued}");
    }
    if let Some(stats) = &report.stats {
        println!(
            "applied since start: {} added, {} updated, {} deleted (last {})",
            stats.files_added,
            stats.files_updated,
            stats.files_deleted,
            format_unix(stats.last_applied_at_unix),
        );
    }
    print_table(report.origins);
}

fn count(origins: &[OriginStatus], class: OriginClass) -> usize {
    origins.iter().filter(|o| o.class == class).count()
}

fn state_label(state: ServiceState) -> String {
    let label = state.to_string();
    match state {
        ServiceState::Ok => label.green().to_string(),
        ServiceState::TemporaryUnavailable | ServiceState::Disabled => label.yellow().to_string(),
        ServiceState::AuthenticationRequired | ServiceState::AccessForbidden => {
            label.red().bold().to_string()
        }
    }
}

fn format_unix(secs: u64) -> String {
    if secs == 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
