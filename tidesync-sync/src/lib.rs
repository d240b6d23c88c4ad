//! # tidesync-sync
//!
//! The remote-change synchronization engine.
//!
//! [`SyncService`] owns the origin registry, the remote change queue and the
//! service state, and applies queued remote changes one at a time through a
//! [`LocalProcessor`]. Remote access goes through the [`RemoteApi`] trait;
//! [`FsRemote`] and [`FsLocalProcessor`] are the directory-backed
//! implementations used by the daemon.

pub mod change_queue;
pub mod error;
pub mod fs_local;
pub mod fs_remote;
pub mod hash_store;
pub mod lifecycle;
pub mod local;
pub mod observer;
pub mod origin_registry;
pub mod remote;
pub mod service;
pub mod service_state;

pub use change_queue::{Admission, Rejection, RemoteChangeQueue};
pub use error::{LocalError, RemoteError, SyncError};
pub use fs_local::FsLocalProcessor;
pub use fs_remote::FsRemote;
pub use lifecycle::{AppState, FileLifecycleSource, LifecycleSnapshot, LifecycleSource};
pub use local::{LocalProcessor, PreparedChange, RemoteContent};
pub use observer::{SyncEvent, SyncObserver};
pub use remote::RemoteApi;
pub use service::{
    BatchCompletion, BatchTicket, DeltaCompletion, DeltaTicket, OriginStatus, RegisterOutcome,
    RemoteChangeOutcome, ServiceStatus, SyncService,
};
