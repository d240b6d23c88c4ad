//! Sync orchestrator.
//!
//! [`SyncService`] is the single owner of the origin registry, the remote
//! change queue and the service state. Every mutation goes through
//! `&mut self`; callers that run remote fetches elsewhere (the daemon) use the
//! split-phase `start_* / fetch_* / commit_*` calls and hand the completion
//! back, where a ticket check turns stale completions into no-ops.
//!
//! Observers are notified only after a mutation is committed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tidesync_core::store::MetadataStore;
use tidesync_core::types::{
    Changestamp, DeltaFeed, FileStatus, FileUrl, Origin, OriginClass, OriginRecord, RemoteChange,
    RemoteEntry, RemoteFileState, ResourceId, ServiceState, SyncAction, SyncStatus,
};

use crate::change_queue::{Admission, RemoteChangeQueue};
use crate::error::{RemoteError, SyncError};
use crate::lifecycle::{AppState, LifecycleSnapshot, LifecycleSource};
use crate::local::{LocalFileState, LocalProcessor, RemoteContent};
use crate::observer::{ObserverList, SyncEvent, SyncObserver};
use crate::origin_registry::{ClassCounts, OriginRegistry, OriginTicket};
use crate::remote::{RemoteApi, SYNC_ROOT_TITLE};
use crate::service_state::{ServiceStateMachine, Transition};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
}

/// Result of one [`SyncService::process_next_remote_change`] call.
///
/// `url` is `None` when nothing was picked up (empty queue, or the service
/// is disabled and the work is deferred).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChangeOutcome {
    pub status: SyncStatus,
    pub url: Option<FileUrl>,
    pub action: SyncAction,
}

impl RemoteChangeOutcome {
    fn idle(status: SyncStatus) -> Self {
        Self {
            status,
            url: None,
            action: SyncAction::None,
        }
    }
}

/// A batch sync checked out for an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTicket {
    pub origin: OriginTicket,
    pub directory_id: ResourceId,
}

/// Full listing of an origin directory, taken at `watermark`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchListing {
    pub watermark: Changestamp,
    pub entries: Vec<RemoteEntry>,
}

#[derive(Debug)]
pub struct BatchCompletion {
    pub ticket: BatchTicket,
    pub result: Result<BatchListing, RemoteError>,
}

/// An incremental sync checked out for every incremental origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaTicket {
    pub origins: Vec<OriginTicket>,
    pub since: Changestamp,
}

#[derive(Debug)]
pub struct DeltaCompletion {
    pub ticket: DeltaTicket,
    pub result: Result<DeltaFeed, RemoteError>,
}

/// Status view for the daemon and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub pending_changes: usize,
    pub origins: Vec<OriginStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginStatus {
    pub origin: Origin,
    pub class: OriginClass,
    pub directory_id: Option<ResourceId>,
    pub last_seen: Option<Changestamp>,
}

// ---------------------------------------------------------------------------
// SyncService
// ---------------------------------------------------------------------------

pub struct SyncService {
    remote: Arc<dyn RemoteApi>,
    local: Arc<dyn LocalProcessor>,
    store: Box<dyn MetadataStore>,
    registry: OriginRegistry,
    queue: RemoteChangeQueue,
    state: ServiceStateMachine,
    observers: ObserverList,
    lifecycle: Option<Arc<dyn LifecycleSource>>,
}

impl SyncService {
    /// Build the engine and load the registry from `store`. Emits nothing.
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        local: Arc<dyn LocalProcessor>,
        store: Box<dyn MetadataStore>,
        sync_enabled: bool,
    ) -> Self {
        let registry = OriginRegistry::from_records(store.load_origins());
        let mut queue = RemoteChangeQueue::new();
        for change in store.load_pending_changes() {
            if matches!(
                registry.class_of(&change.url.origin),
                Some(OriginClass::PendingBatch | OriginClass::Incremental)
            ) {
                queue.admit(change.url, change.state);
            }
        }
        let counts = registry.counts();
        tracing::info!(
            "sync service initialised: {} pending-batch, {} incremental, {} disabled, {} queued",
            counts.pending_batch,
            counts.incremental,
            counts.disabled,
            queue.len()
        );
        Self {
            remote,
            local,
            store,
            registry,
            queue,
            state: ServiceStateMachine::new(sync_enabled),
            observers: ObserverList::default(),
            lifecycle: None,
        }
    }

    pub fn with_lifecycle(mut self, source: Arc<dyn LifecycleSource>) -> Self {
        self.lifecycle = Some(source);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SyncObserver>) {
        self.observers.add(observer);
    }

    // -- read accessors ----------------------------------------------------

    pub fn service_state(&self) -> ServiceState {
        self.state.state()
    }

    pub fn pending_changes(&self) -> usize {
        self.queue.len()
    }

    pub fn origins(&self) -> Vec<(Origin, OriginRecord)> {
        self.registry.snapshot()
    }

    pub fn origin_class(&self, origin: &Origin) -> Option<OriginClass> {
        self.registry.class_of(origin)
    }

    pub fn class_counts(&self) -> ClassCounts {
        self.registry.counts()
    }

    pub fn queued_change(&self, url: &FileUrl) -> Option<&RemoteFileState> {
        self.queue.get(url)
    }

    pub fn store(&self) -> &dyn MetadataStore {
        self.store.as_ref()
    }

    /// Shared handle to the remote, for fetches run off the engine context.
    pub fn remote(&self) -> Arc<dyn RemoteApi> {
        Arc::clone(&self.remote)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            state: self.state.state(),
            pending_changes: self.queue.len(),
            origins: self
                .registry
                .snapshot()
                .into_iter()
                .map(|(origin, record)| OriginStatus {
                    origin,
                    class: record.class,
                    directory_id: record.directory_id,
                    last_seen: record.last_seen,
                })
                .collect(),
        }
    }

    // -- origin registration -----------------------------------------------

    /// Register `origin` and run its initial batch sync.
    ///
    /// While disabled the origin is only recorded; directory lookup and the
    /// listing wait for enablement.
    pub async fn register_origin(&mut self, origin: &Origin) -> Result<RegisterOutcome, SyncError> {
        if self.registry.contains(origin) {
            tracing::debug!("register: {origin} already registered");
            return Ok(RegisterOutcome::AlreadyRegistered);
        }
        if !self.state.check_remote_io()? {
            self.registry.insert_pending(origin.clone(), None);
            self.persist(origin)?;
            tracing::info!("registered {origin} (sync disabled, listing deferred)");
            return Ok(RegisterOutcome::Registered);
        }

        let directory = self.ensure_origin_directory(origin).await?;
        self.registry.insert_pending(origin.clone(), Some(directory));
        self.persist(origin)?;
        tracing::info!("registered {origin}");
        self.run_batch_sync(origin).await?;
        Ok(RegisterOutcome::Registered)
    }

    /// Forget `origin`. Unknown origins are a no-op.
    pub async fn unregister_origin(&mut self, origin: &Origin) -> Result<(), SyncError> {
        let Some(record) = self.registry.remove(origin) else {
            tracing::debug!("unregister: {origin} not registered");
            return Ok(());
        };
        self.store.remove_origin(origin)?;
        if self.queue.remove_origin(origin) > 0 {
            self.emit_queue();
        }
        tracing::info!("unregistered {origin}");

        let Some(directory) = record.directory_id else {
            return Ok(());
        };
        if !matches!(self.state.check_remote_io(), Ok(true)) {
            tracing::debug!("leaving remote directory {directory} of {origin} in place");
            return Ok(());
        }
        let result = self.remote.unlink_directory(&directory).await;
        if let Err(err) = self.observe(result) {
            tracing::warn!("failed to unlink remote directory {directory} of {origin}: {err}");
        }
        Ok(())
    }

    /// Align origin classes with application lifecycle state.
    ///
    /// Re-enabled origins go back to pending-batch; their batch runs on the
    /// next [`Self::sync_pending_batches`].
    pub async fn reconcile_with_lifecycle(
        &mut self,
        snapshot: &LifecycleSnapshot,
    ) -> Result<(), SyncError> {
        for (origin, record) in self.registry.snapshot() {
            match (snapshot.state_of(origin.app_id()), record.class) {
                (Some(AppState::Uninstalled), _) => self.unregister_origin(&origin).await?,
                (Some(AppState::Disabled), class) if class != OriginClass::Disabled => {
                    self.registry.reclassify(&origin, OriginClass::Disabled);
                    self.persist(&origin)?;
                    if self.queue.remove_origin(&origin) > 0 {
                        self.emit_queue();
                    }
                    tracing::info!("{origin}: application disabled");
                }
                (Some(AppState::Enabled), OriginClass::Disabled) => {
                    self.registry.reclassify(&origin, OriginClass::PendingBatch);
                    self.persist(&origin)?;
                    tracing::info!("{origin}: application enabled, awaiting batch sync");
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reconcile against the configured lifecycle source, if any.
    pub async fn poll_lifecycle(&mut self) -> Result<(), SyncError> {
        let Some(source) = self.lifecycle.clone() else {
            return Ok(());
        };
        let snapshot = source.snapshot()?;
        self.reconcile_with_lifecycle(&snapshot).await
    }

    // -- service state -----------------------------------------------------

    /// Enable or disable sync. Enabling reconciles with the lifecycle source
    /// and resumes pending-batch origins.
    pub async fn set_sync_enabled(&mut self, enabled: bool) -> Result<(), SyncError> {
        let Some(transition) = self.state.set_enabled(enabled) else {
            return Ok(());
        };
        self.emit_state(transition);
        if enabled {
            self.poll_lifecycle().await?;
            self.sync_pending_batches().await?;
        }
        Ok(())
    }

    pub fn notify_reauthenticated(&mut self) {
        if let Some(transition) = self.state.on_reauthenticated() {
            self.emit_state(transition);
        }
    }

    // -- batch sync --------------------------------------------------------

    /// Check out a batch sync for a pending-batch origin.
    ///
    /// Returns `None` when there is nothing to do: the origin is not
    /// pending-batch, or sync is disabled.
    pub async fn start_batch(&mut self, origin: &Origin) -> Result<Option<BatchTicket>, SyncError> {
        let record = self
            .registry
            .get(origin)
            .ok_or_else(|| SyncError::OriginNotRegistered(origin.clone()))?;
        if record.class != OriginClass::PendingBatch {
            return Ok(None);
        }
        let known_directory = record.directory_id.clone();
        if !self.state.check_remote_io()? {
            return Ok(None);
        }
        let directory_id = match known_directory {
            Some(id) => id,
            None => {
                let id = self.ensure_origin_directory(origin).await?;
                self.registry.set_directory(origin, id.clone());
                self.persist(origin)?;
                id
            }
        };
        let Some(ticket) = self.registry.ticket(origin) else {
            return Ok(None);
        };
        Ok(Some(BatchTicket {
            origin: ticket,
            directory_id,
        }))
    }

    /// Watermark first, then listing: anything changed after the watermark
    /// is picked up again by the delta feed.
    pub async fn fetch_batch_listing(
        remote: &dyn RemoteApi,
        ticket: BatchTicket,
    ) -> BatchCompletion {
        let result = async {
            let watermark = remote.get_largest_changestamp().await?;
            let entries = remote.list_directory(&ticket.directory_id).await?;
            Ok::<_, RemoteError>(BatchListing { watermark, entries })
        }
        .await;
        BatchCompletion { ticket, result }
    }

    /// Queue the listing and move the origin to incremental.
    ///
    /// Returns the number of admitted files; 0 if the ticket went stale.
    pub fn commit_batch(&mut self, completion: BatchCompletion) -> Result<usize, SyncError> {
        let BatchCompletion { ticket, result } = completion;
        let listing = self.observe(result)?;
        let origin = ticket.origin.origin.clone();
        if !self.registry.is_current(&ticket.origin) {
            tracing::debug!("discarding stale batch listing for {origin}");
            return Ok(0);
        }

        let mut admitted = 0;
        for entry in listing.entries.iter().filter(|e| !e.is_deleted) {
            if let Some(admission) = self.admit_remote_entry(&origin, entry, listing.watermark)? {
                admitted += usize::from(admission.is_accepted());
            }
        }
        self.persist_queue()?;
        self.registry
            .promote_to_incremental(&origin, listing.watermark);
        self.persist(&origin)?;
        tracing::info!(
            "batch sync for {origin}: {admitted} file(s) queued, watermark {}",
            listing.watermark
        );
        Ok(admitted)
    }

    pub async fn run_batch_sync(&mut self, origin: &Origin) -> Result<usize, SyncError> {
        let Some(ticket) = self.start_batch(origin).await? else {
            return Ok(0);
        };
        let remote = self.remote();
        let completion = Self::fetch_batch_listing(remote.as_ref(), ticket).await;
        self.commit_batch(completion)
    }

    /// Batch-sync every pending-batch origin. Per-origin failures are logged
    /// and skipped.
    pub async fn sync_pending_batches(&mut self) -> Result<usize, SyncError> {
        let mut admitted = 0;
        for origin in self.registry.origins_in(OriginClass::PendingBatch) {
            if !self.state.check_remote_io()? {
                break;
            }
            match self.run_batch_sync(&origin).await {
                Ok(n) => admitted += n,
                Err(err) => tracing::warn!("batch sync for {origin} failed: {err}"),
            }
        }
        Ok(admitted)
    }

    /// Send an incremental origin back through a full listing.
    pub async fn full_resync(&mut self, origin: &Origin) -> Result<usize, SyncError> {
        match self.registry.class_of(origin) {
            None => return Err(SyncError::OriginNotRegistered(origin.clone())),
            Some(OriginClass::Disabled) => return Err(SyncError::OriginDisabled(origin.clone())),
            Some(_) => {}
        }
        self.registry.reclassify(origin, OriginClass::PendingBatch);
        self.persist(origin)?;
        tracing::info!("full resync requested for {origin}");
        self.run_batch_sync(origin).await
    }

    // -- incremental sync --------------------------------------------------

    /// Check out a delta fetch covering every incremental origin.
    pub fn start_incremental(&self) -> Result<Option<DeltaTicket>, SyncError> {
        if !self.state.check_remote_io()? {
            return Ok(None);
        }
        let mut since: Option<Changestamp> = None;
        let mut origins = Vec::new();
        for origin in self.registry.origins_in(OriginClass::Incremental) {
            let Some(record) = self.registry.get(&origin) else {
                continue;
            };
            let (Some(last_seen), Some(_)) = (record.last_seen, &record.directory_id) else {
                continue;
            };
            since = Some(since.map_or(last_seen, |s| s.min(last_seen)));
            if let Some(ticket) = self.registry.ticket(&origin) {
                origins.push(ticket);
            }
        }
        Ok(since.map(|since| DeltaTicket { origins, since }))
    }

    pub async fn fetch_delta(remote: &dyn RemoteApi, ticket: DeltaTicket) -> DeltaCompletion {
        let result = remote.get_delta_feed(ticket.since).await;
        DeltaCompletion { ticket, result }
    }

    /// Route feed entries to origins by parent directory and advance
    /// watermarks. Returns the number of admitted changes.
    pub fn commit_delta(&mut self, completion: DeltaCompletion) -> Result<usize, SyncError> {
        let DeltaCompletion { ticket, result } = completion;
        let feed = self.observe(result)?;

        let mut by_directory: HashMap<ResourceId, (Origin, Changestamp)> = HashMap::new();
        for t in ticket.origins.iter().filter(|t| self.registry.is_current(t)) {
            let Some(record) = self.registry.get(&t.origin) else {
                continue;
            };
            if let (Some(dir), Some(seen)) = (&record.directory_id, record.last_seen) {
                by_directory.insert(dir.clone(), (t.origin.clone(), seen));
            }
        }

        let mut admitted = 0;
        for entry in &feed.entries {
            let Some(parent) = &entry.parent_id else {
                continue;
            };
            let Some((origin, last_seen)) = by_directory.get(parent) else {
                continue;
            };
            if entry.changestamp <= *last_seen {
                continue;
            }
            if let Some(admission) = self.admit_remote_entry(origin, entry, entry.changestamp)? {
                admitted += usize::from(admission.is_accepted());
            }
        }

        self.persist_queue()?;
        let origins: Vec<Origin> = by_directory.into_values().map(|(o, _)| o).collect();
        for origin in &origins {
            self.registry
                .advance_watermark(origin, feed.largest_changestamp);
            self.persist(origin)?;
        }
        tracing::debug!(
            "delta sync: {} entries, {admitted} admitted, watermark {}",
            feed.entries.len(),
            feed.largest_changestamp
        );
        Ok(admitted)
    }

    pub async fn run_incremental_sync(&mut self) -> Result<usize, SyncError> {
        let Some(ticket) = self.start_incremental()? else {
            return Ok(0);
        };
        let remote = self.remote();
        let completion = Self::fetch_delta(remote.as_ref(), ticket).await;
        self.commit_delta(completion)
    }

    // -- admission ---------------------------------------------------------

    pub fn admit(&mut self, url: FileUrl, state: RemoteFileState) -> Result<Admission, SyncError> {
        match self.registry.class_of(&url.origin) {
            None => return Err(SyncError::OriginNotRegistered(url.origin)),
            Some(OriginClass::Disabled) => return Err(SyncError::OriginDisabled(url.origin)),
            Some(_) => {}
        }
        let admission = self.queue.admit(url, state);
        if admission.is_accepted() {
            self.emit_queue();
        }
        Ok(admission)
    }

    /// Admit a listing or feed entry. Folders yield `None`.
    pub fn admit_remote_entry(
        &mut self,
        origin: &Origin,
        entry: &RemoteEntry,
        changestamp: Changestamp,
    ) -> Result<Option<Admission>, SyncError> {
        if entry.is_folder() {
            return Ok(None);
        }
        let url = FileUrl::new(origin.clone(), &entry.title);
        let state = RemoteFileState {
            resource_id: entry.resource_id.clone(),
            is_deleted: entry.is_deleted,
            fingerprint: entry.fingerprint.clone(),
            changestamp,
        };
        self.admit(url, state).map(Some)
    }

    // -- apply pipeline ----------------------------------------------------

    /// Apply the oldest queued change to local state.
    ///
    /// `FileBusy` leaves the change queued. Failures that moved the service
    /// state keep it queued too; any other failure drops it and is returned
    /// as [`SyncError::RemoteChange`].
    pub async fn process_next_remote_change(&mut self) -> Result<RemoteChangeOutcome, SyncError> {
        if !self.state.check_remote_io()? {
            return Ok(RemoteChangeOutcome::idle(SyncStatus::Ok));
        }
        let Some(change) = self.queue.peek_next() else {
            return Ok(RemoteChangeOutcome::idle(SyncStatus::NoChangeToSync));
        };
        match self.apply_change(&change).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if !is_service_level(&err) {
                    self.finish(&change);
                }
                tracing::warn!("failed to apply remote change to {}: {err}", change.url);
                Err(SyncError::RemoteChange {
                    url: change.url,
                    source: Box::new(err),
                })
            }
        }
    }

    async fn apply_change(
        &mut self,
        change: &RemoteChange,
    ) -> Result<RemoteChangeOutcome, SyncError> {
        let url = &change.url;
        let local = Arc::clone(&self.local);

        let prepared = local.prepare_for_change(url).await?;
        local.clear_local_changes(url).await?;
        if prepared.state == LocalFileState::Busy {
            tracing::debug!("{url} is busy; change stays queued");
            return Ok(RemoteChangeOutcome {
                status: SyncStatus::FileBusy,
                url: Some(url.clone()),
                action: SyncAction::None,
            });
        }

        if change.state.is_deleted && prepared.state == LocalFileState::NotFound {
            self.finish(change);
            return Ok(RemoteChangeOutcome {
                status: SyncStatus::Ok,
                url: Some(url.clone()),
                action: SyncAction::None,
            });
        }

        let content = if change.state.is_deleted {
            RemoteContent::Delete
        } else {
            let downloaded = self.remote.download_file(&change.state.resource_id).await;
            RemoteContent::File(self.observe(downloaded)?)
        };
        let applied = local
            .apply_remote_change(url, &change.state, content, &prepared)
            .await?;

        self.finish(change);
        self.observers.notify(SyncEvent::FileStatusChanged {
            url: url.clone(),
            status: FileStatus::Synced,
            action: applied.action,
            direction: applied.direction,
        });
        Ok(RemoteChangeOutcome {
            status: SyncStatus::Ok,
            url: Some(url.clone()),
            action: applied.action,
        })
    }

    fn finish(&mut self, change: &RemoteChange) {
        if self.queue.complete(&change.url, change.state.changestamp) {
            self.emit_queue();
        }
    }

    // -- teardown ----------------------------------------------------------

    /// Write every origin record and the unapplied changes through, then
    /// flush the store.
    pub fn teardown(mut self) -> Result<(), SyncError> {
        for (origin, record) in self.registry.snapshot() {
            self.store.set_origin_classification(&origin, &record)?;
        }
        self.persist_queue()?;
        self.store.flush()?;
        tracing::info!("sync service shut down");
        Ok(())
    }

    // -- helpers -----------------------------------------------------------

    /// Must run before a watermark moves past the queued changestamps.
    fn persist_queue(&mut self) -> Result<(), SyncError> {
        self.store.set_pending_changes(self.queue.snapshot())?;
        Ok(())
    }

    async fn ensure_sync_root(&mut self) -> Result<ResourceId, SyncError> {
        if let Some(id) = self.store.sync_root() {
            return Ok(id);
        }
        let remote = self.remote();
        let found = remote.find_directory(None, SYNC_ROOT_TITLE).await;
        let id = match self.observe(found)? {
            Some(id) => id,
            None => {
                let created = remote.create_directory(None, SYNC_ROOT_TITLE).await;
                self.observe(created)?
            }
        };
        self.store.set_sync_root(id.clone())?;
        Ok(id)
    }

    /// Find the origin's directory under the sync root, creating it if absent.
    async fn ensure_origin_directory(&mut self, origin: &Origin) -> Result<ResourceId, SyncError> {
        let root = self.ensure_sync_root().await?;
        let remote = self.remote();
        let title = origin.app_id();
        let found = remote.find_directory(Some(&root), title).await;
        if let Some(id) = self.observe(found)? {
            tracing::debug!("reusing remote directory {id} for {origin}");
            return Ok(id);
        }
        let created = remote.create_directory(Some(&root), title).await;
        let id = self.observe(created)?;
        tracing::info!("created remote directory {id} for {origin}");
        Ok(id)
    }

    /// Feed a remote call's outcome into the service state machine.
    fn observe<T>(&mut self, result: Result<T, RemoteError>) -> Result<T, SyncError> {
        match result {
            Ok(value) => {
                if let Some(transition) = self.state.on_remote_success() {
                    self.emit_state(transition);
                }
                Ok(value)
            }
            Err(err) => {
                if let Some(transition) = self.state.on_remote_error(&err) {
                    self.emit_state(transition);
                }
                Err(err.into())
            }
        }
    }

    fn persist(&mut self, origin: &Origin) -> Result<(), SyncError> {
        if let Some(record) = self.registry.get(origin) {
            self.store.set_origin_classification(origin, record)?;
        }
        Ok(())
    }

    fn emit_queue(&self) {
        self.observers.notify(SyncEvent::RemoteQueueUpdated {
            pending: self.queue.len(),
        });
    }

    fn emit_state(&self, transition: Transition) {
        self.observers.notify(SyncEvent::ServiceStateUpdated {
            state: transition.to,
            description: transition.description,
        });
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("state", &self.state.state())
            .field("pending_changes", &self.queue.len())
            .field("origins", &self.registry.counts())
            .field("observers", &self.observers)
            .finish()
    }
}

/// Failures that change the service state rather than condemn the change.
fn is_service_level(err: &SyncError) -> bool {
    match err {
        SyncError::Remote(remote) => remote.service_state().is_some(),
        SyncError::ServiceUnavailable(_) => true,
        _ => false,
    }
}
