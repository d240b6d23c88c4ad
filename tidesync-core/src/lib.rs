//! tidesync core library: domain types, metadata persistence, config, errors.
//!
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`StoreError`]
//! - [`store`]: [`MetadataStore`] trait, YAML-file and in-memory stores
//! - [`config`]: optional daemon config
//! - [`paths`]: `~/.tidesync/` layout

pub mod config;
pub mod error;
pub mod paths;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::StoreError;
pub use store::{MemoryMetadataStore, MetadataStore, YamlMetadataStore};
pub use types::{
    Changestamp, DeltaFeed, EntryKind, FileStatus, FileUrl, Fingerprint, Origin, OriginClass,
    OriginRecord, RemoteChange, RemoteEntry, RemoteFileState, ResourceId, ServiceState,
    SyncAction, SyncDirection, SyncStatus,
};
