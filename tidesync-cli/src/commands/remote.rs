//! `tidesync remote`: edit the directory-backed remote store directly.
//!
//! Changes made here show up in the delta feed like any other remote edit.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use tidesync_core::store::{MetadataStore, YamlMetadataStore};
use tidesync_core::types::{Origin, ResourceId};
use tidesync_core::Config;
use tidesync_daemon::parse_origin;
use tidesync_sync::FsRemote;

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    /// Upload a local file into an origin's remote directory.
    Put {
        origin: String,
        file: PathBuf,
        /// Remote title; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a file from an origin's remote directory.
    Rm { origin: String, name: String },
    /// List files in an origin's remote directory.
    Ls { origin: String },
}

#[derive(Tabled)]
struct RemoteRow {
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "changestamp")]
    changestamp: i64,
}

pub fn run(command: RemoteCommand) -> Result<()> {
    let home = home_dir()?;
    let config = Config::load_at(&home).context("failed to load config")?;
    let remote =
        FsRemote::open(config.remote_root_at(&home)).context("failed to open remote store")?;

    match command {
        RemoteCommand::Put { origin, file, name } => {
            let origin = parse_origin(&origin);
            let directory = origin_directory(&home, &origin)?;
            let title = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("{} has no file name", file.display()))?,
            };
            let content =
                std::fs::read(&file).with_context(|| format!("read {}", file.display()))?;
            let id = remote
                .put_file(&directory, &title, &content)
                .with_context(|| format!("failed to upload {title}"))?;
            println!("uploaded {title} to {origin} ({id})");
        }
        RemoteCommand::Rm { origin, name } => {
            let origin = parse_origin(&origin);
            let directory = origin_directory(&home, &origin)?;
            let files = remote.files_in(&directory).context("failed to list remote files")?;
            let Some(entry) = files.into_iter().find(|e| e.title == name) else {
                bail!("{name} not found in {origin}");
            };
            remote
                .delete_file(&entry.resource_id)
                .with_context(|| format!("failed to delete {name}"))?;
            println!("deleted {name} from {origin}");
        }
        RemoteCommand::Ls { origin } => {
            let origin = parse_origin(&origin);
            let directory = origin_directory(&home, &origin)?;
            let rows: Vec<RemoteRow> = remote
                .files_in(&directory)
                .context("failed to list remote files")?
                .into_iter()
                .map(|e| RemoteRow {
                    title: e.title,
                    id: e.resource_id.to_string(),
                    changestamp: e.changestamp.0,
                })
                .collect();
            if rows.is_empty() {
                println!("{origin} has no remote files");
                return Ok(());
            }
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }

    Ok(())
}

fn origin_directory(home: &Path, origin: &Origin) -> Result<ResourceId> {
    let store = YamlMetadataStore::open_at(home).context("failed to open metadata store")?;
    store.get_directory_id_for_origin(origin).with_context(|| {
        format!("{origin} has no remote directory; run `tidesync origin register` first")
    })
}
