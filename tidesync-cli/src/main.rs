//! tidesync: remote-change sync for per-application file trees.
//!
//! # Usage
//!
//! ```text
//! tidesync origin register|unregister|resync <origin>
//! tidesync origin list [--json]
//! tidesync sync [--json]
//! tidesync status [--json]
//! tidesync service enable|disable
//! tidesync app set <app-id> enabled|disabled|uninstalled
//! tidesync remote put <origin> <file> [--name <title>]
//! tidesync remote rm|ls <origin> ...
//! tidesync daemon start|stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    app::AppCommand, daemon::DaemonCommand, origin::OriginCommand, remote::RemoteCommand,
    service::ServiceCommand, status::StatusArgs, sync::SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "tidesync",
    version,
    about = "Keep local application file trees in step with a remote store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register, unregister, resync or list origins.
    Origin {
        #[command(subcommand)]
        command: OriginCommand,
    },

    /// Fetch pending listings and the delta feed, then apply queued changes.
    Sync(SyncArgs),

    /// Show service state, queue depth and origins.
    Status(StatusArgs),

    /// Turn remote sync on or off.
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },

    /// Record application lifecycle state.
    App {
        #[command(subcommand)]
        command: AppCommand,
    },

    /// Edit the directory-backed remote store.
    Remote {
        #[command(subcommand)]
        command: RemoteCommand,
    },

    /// Manage the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Origin { command } => commands::origin::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Service { command } => commands::service::run(command),
        Commands::App { command } => commands::app::run(command),
        Commands::Remote { command } => commands::remote::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
