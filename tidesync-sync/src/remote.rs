//! Capability interface to the remote file store.

use async_trait::async_trait;

use tidesync_core::types::{Changestamp, DeltaFeed, RemoteEntry, ResourceId};

use crate::error::RemoteError;

/// Title of the well-known directory that holds one directory per origin.
pub const SYNC_ROOT_TITLE: &str = "tidesync";

/// Narrow remote-store API consumed by the engine.
///
/// Implementations return already-parsed entries; the engine never sees the
/// wire format.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Find a live directory titled `title` under `parent` (`None` = store root).
    async fn find_directory(
        &self,
        parent: Option<&ResourceId>,
        title: &str,
    ) -> Result<Option<ResourceId>, RemoteError>;

    async fn create_directory(
        &self,
        parent: Option<&ResourceId>,
        title: &str,
    ) -> Result<ResourceId, RemoteError>;

    /// Detach a directory from its parent (origin unregistration).
    async fn unlink_directory(&self, directory: &ResourceId) -> Result<(), RemoteError>;

    /// Live children of `directory`, files and folders.
    async fn list_directory(&self, directory: &ResourceId)
        -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Every entry changed after `since`, plus the feed position it is complete up to.
    async fn get_delta_feed(&self, since: Changestamp) -> Result<DeltaFeed, RemoteError>;

    async fn download_file(&self, resource_id: &ResourceId) -> Result<Vec<u8>, RemoteError>;

    async fn get_largest_changestamp(&self) -> Result<Changestamp, RemoteError>;
}
