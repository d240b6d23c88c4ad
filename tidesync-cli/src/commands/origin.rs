//! `tidesync origin`: register, unregister, resync and list origins.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use tidesync_core::store::{MetadataStore, YamlMetadataStore};
use tidesync_daemon::{parse_origin, DaemonRequest, SyncSummary};
use tidesync_sync::{OriginStatus, RegisterOutcome};

use super::{dispatch, home_dir, print_json, sync::print_summary};

#[derive(Subcommand, Debug)]
pub enum OriginCommand {
    /// Register an origin (`notes` or `app://notes/`) and run its first listing.
    Register { origin: String },
    /// Stop syncing an origin and unlink its remote directory.
    Unregister { origin: String },
    /// Re-list an origin from scratch.
    Resync { origin: String },
    /// Show registered origins.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Deserialize)]
struct RegisterResponse {
    outcome: RegisterOutcome,
    summary: SyncSummary,
}

#[derive(Tabled)]
struct OriginRow {
    #[tabled(rename = "origin")]
    origin: String,
    #[tabled(rename = "class")]
    class: String,
    #[tabled(rename = "directory")]
    directory: String,
    #[tabled(rename = "last seen")]
    last_seen: String,
}

pub fn run(command: OriginCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        OriginCommand::Register { origin } => {
            let origin = parse_origin(&origin);
            let data = dispatch(&home, DaemonRequest::for_origin("register", &origin))
                .with_context(|| format!("failed to register {origin}"))?;
            let response: RegisterResponse =
                serde_json::from_value(data).context("unexpected register response")?;
            match response.outcome {
                RegisterOutcome::Registered => println!("registered {origin}"),
                RegisterOutcome::AlreadyRegistered => println!("{origin} is already registered"),
            }
            print_summary(&response.summary);
        }
        OriginCommand::Unregister { origin } => {
            let origin = parse_origin(&origin);
            dispatch(&home, DaemonRequest::for_origin("unregister", &origin))
                .with_context(|| format!("failed to unregister {origin}"))?;
            println!("unregistered {origin}");
        }
        OriginCommand::Resync { origin } => {
            let origin = parse_origin(&origin);
            let data = dispatch(&home, DaemonRequest::for_origin("resync", &origin))
                .with_context(|| format!("failed to resync {origin}"))?;
            let summary: SyncSummary =
                serde_json::from_value(data).context("unexpected resync summary")?;
            print_summary(&summary);
        }
        OriginCommand::List { json } => {
            let origins = load_origins(&home)?;
            if json {
                return print_json(&origins);
            }
            print_table(origins);
        }
    }

    Ok(())
}

/// Origins as recorded in the metadata file.
pub(crate) fn load_origins(home: &std::path::Path) -> Result<Vec<OriginStatus>> {
    let store = YamlMetadataStore::open_at(home).context("failed to open metadata store")?;
    Ok(store
        .load_origins()
        .into_iter()
        .map(|(origin, record)| OriginStatus {
            origin,
            class: record.class,
            directory_id: record.directory_id,
            last_seen: record.last_seen,
        })
        .collect())
}

pub(crate) fn print_table(origins: Vec<OriginStatus>) {
    if origins.is_empty() {
        println!("No origins registered. Run `tidesync origin register <app>` first.");
        return;
    }
    let rows: Vec<OriginRow> = origins
        .into_iter()
        .map(|status| OriginRow {
            origin: status.origin.to_string(),
            class: status.class.to_string(),
            directory: status
                .directory_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            last_seen: status
                .last_seen
                .map(|cs| cs.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
