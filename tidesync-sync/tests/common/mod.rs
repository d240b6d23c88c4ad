//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tidesync_core::store::{MemoryMetadataStore, MetadataStore};
use tidesync_core::types::{
    Changestamp, DeltaFeed, EntryKind, FileUrl, Fingerprint, Origin, OriginClass, OriginRecord,
    RemoteEntry, RemoteFileState, ResourceId, SyncAction, SyncDirection,
};
use tidesync_sync::local::{AppliedChange, LocalFileState, LocalMetadata, PreparedChange};
use tidesync_sync::{
    LocalError, LocalProcessor, RemoteApi, RemoteContent, RemoteError, SyncEvent, SyncObserver,
    SyncService,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn notes() -> Origin {
    Origin::for_app("notes")
}

pub fn url(path: &str) -> FileUrl {
    FileUrl::new(notes(), path)
}

pub fn file_state(id: &str, deleted: bool, md5: &str, cs: i64) -> RemoteFileState {
    RemoteFileState {
        resource_id: ResourceId::from(id),
        is_deleted: deleted,
        fingerprint: Fingerprint::from(md5),
        changestamp: Changestamp(cs),
    }
}

pub fn incremental_record(dir: &str, last_seen: i64) -> OriginRecord {
    let mut record = OriginRecord::pending(Some(ResourceId::from(dir)));
    record.class = OriginClass::Incremental;
    record.last_seen = Some(Changestamp(last_seen));
    record
}

// ---------------------------------------------------------------------------
// MemoryRemote
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RemoteState {
    entries: BTreeMap<ResourceId, RemoteEntry>,
    contents: HashMap<ResourceId, Vec<u8>>,
    largest: i64,
    next_id: u64,
    calls: Vec<&'static str>,
    fail_next: Option<RemoteError>,
}

impl RemoteState {
    fn call(&mut self, name: &'static str) -> Result<(), RemoteError> {
        self.calls.push(name);
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn insert(
        &mut self,
        prefix: &str,
        parent: Option<&ResourceId>,
        title: &str,
        kind: EntryKind,
        fingerprint: &str,
    ) -> ResourceId {
        self.next_id += 1;
        self.largest += 1;
        let id = ResourceId(format!("{prefix}:{}", self.next_id));
        self.entries.insert(
            id.clone(),
            RemoteEntry {
                resource_id: id.clone(),
                title: title.to_string(),
                is_deleted: false,
                fingerprint: Fingerprint::from(fingerprint),
                parent_id: parent.cloned(),
                kind,
                changestamp: Changestamp(self.largest),
            },
        );
        id
    }
}

/// In-memory remote store with call recording and one-shot failure injection.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_directory(&self, parent: Option<&ResourceId>, title: &str) -> ResourceId {
        self.state
            .lock()
            .unwrap()
            .insert("folder", parent, title, EntryKind::Folder, "")
    }

    pub fn add_file(&self, parent: &ResourceId, title: &str, content: &[u8]) -> ResourceId {
        let mut state = self.state.lock().unwrap();
        let md5 = format!("md5-{}", content.len());
        let id = state.insert("file", Some(parent), title, EntryKind::File, &md5);
        state.contents.insert(id.clone(), content.to_vec());
        id
    }

    pub fn update_file(&self, id: &ResourceId, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.largest += 1;
        let cs = Changestamp(state.largest);
        let entry = state.entries.get_mut(id).expect("known file");
        entry.fingerprint = Fingerprint(format!("md5-{}-{}", content.len(), cs));
        entry.changestamp = cs;
        state.contents.insert(id.clone(), content.to_vec());
    }

    pub fn delete(&self, id: &ResourceId) {
        let mut state = self.state.lock().unwrap();
        state.largest += 1;
        let cs = Changestamp(state.largest);
        let entry = state.entries.get_mut(id).expect("known entry");
        entry.is_deleted = true;
        entry.changestamp = cs;
        state.contents.remove(id);
    }

    /// The next remote call, whichever it is, fails with `err`.
    pub fn fail_next(&self, err: RemoteError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| **c == name).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn entry(&self, id: &ResourceId) -> Option<RemoteEntry> {
        self.state.lock().unwrap().entries.get(id).cloned()
    }

    pub fn largest(&self) -> Changestamp {
        Changestamp(self.state.lock().unwrap().largest)
    }
}

#[async_trait]
impl RemoteApi for MemoryRemote {
    async fn find_directory(
        &self,
        parent: Option<&ResourceId>,
        title: &str,
    ) -> Result<Option<ResourceId>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.call("find_directory")?;
        Ok(state
            .entries
            .values()
            .find(|e| {
                e.is_folder() && !e.is_deleted && e.title == title && e.parent_id.as_ref() == parent
            })
            .map(|e| e.resource_id.clone()))
    }

    async fn create_directory(
        &self,
        parent: Option<&ResourceId>,
        title: &str,
    ) -> Result<ResourceId, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.call("create_directory")?;
        Ok(state.insert("folder", parent, title, EntryKind::Folder, ""))
    }

    async fn unlink_directory(&self, directory: &ResourceId) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.call("unlink_directory")?;
        state.largest += 1;
        let cs = Changestamp(state.largest);
        let entry = state
            .entries
            .get_mut(directory)
            .ok_or_else(|| RemoteError::NotFound(directory.clone()))?;
        entry.is_deleted = true;
        entry.changestamp = cs;
        Ok(())
    }

    async fn list_directory(
        &self,
        directory: &ResourceId,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.call("list_directory")?;
        Ok(state
            .entries
            .values()
            .filter(|e| !e.is_deleted && e.parent_id.as_ref() == Some(directory))
            .cloned()
            .collect())
    }

    async fn get_delta_feed(&self, since: Changestamp) -> Result<DeltaFeed, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.call("get_delta_feed")?;
        let mut entries: Vec<RemoteEntry> = state
            .entries
            .values()
            .filter(|e| e.changestamp > since)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.changestamp);
        Ok(DeltaFeed {
            entries,
            largest_changestamp: Changestamp(state.largest),
        })
    }

    async fn download_file(&self, resource_id: &ResourceId) -> Result<Vec<u8>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.call("download_file")?;
        state
            .contents
            .get(resource_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(resource_id.clone()))
    }

    async fn get_largest_changestamp(&self) -> Result<Changestamp, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.call("get_largest_changestamp")?;
        Ok(Changestamp(state.largest))
    }
}

// ---------------------------------------------------------------------------
// RecordingLocalProcessor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LocalState {
    files: HashMap<FileUrl, Vec<u8>>,
    busy: HashSet<FileUrl>,
    calls: Vec<String>,
}

/// Local processor over an in-memory file map; records every call.
#[derive(Debug, Default)]
pub struct RecordingLocalProcessor {
    state: Mutex<LocalState>,
}

impl RecordingLocalProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_file(&self, url: FileUrl, content: &[u8]) {
        self.state.lock().unwrap().files.insert(url, content.to_vec());
    }

    pub fn set_busy(&self, url: FileUrl, busy: bool) {
        let mut state = self.state.lock().unwrap();
        if busy {
            state.busy.insert(url);
        } else {
            state.busy.remove(&url);
        }
    }

    pub fn file(&self, url: &FileUrl) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(url).cloned()
    }

    /// Calls as `"<op> <url>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl LocalProcessor for RecordingLocalProcessor {
    async fn prepare_for_change(&self, url: &FileUrl) -> Result<PreparedChange, LocalError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("prepare {url}"));
        if state.busy.contains(url) {
            return Ok(PreparedChange::busy());
        }
        Ok(match state.files.get(url) {
            Some(content) => PreparedChange {
                state: LocalFileState::Unmodified,
                metadata: Some(LocalMetadata {
                    size: content.len() as u64,
                    modified: None,
                }),
                local_changes: Vec::new(),
            },
            None => PreparedChange::not_found(),
        })
    }

    async fn clear_local_changes(&self, url: &FileUrl) -> Result<(), LocalError> {
        self.state.lock().unwrap().calls.push(format!("clear {url}"));
        Ok(())
    }

    async fn apply_remote_change(
        &self,
        url: &FileUrl,
        _remote: &RemoteFileState,
        content: RemoteContent,
        prepared: &PreparedChange,
    ) -> Result<AppliedChange, LocalError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("apply {url}"));
        let action = match content {
            RemoteContent::File(bytes) => {
                state.files.insert(url.clone(), bytes);
                if prepared.state == LocalFileState::NotFound {
                    SyncAction::Added
                } else {
                    SyncAction::Updated
                }
            }
            RemoteContent::Delete => match state.files.remove(url) {
                Some(_) => SyncAction::Deleted,
                None => SyncAction::None,
            },
        };
        Ok(AppliedChange {
            action,
            direction: SyncDirection::RemoteToLocal,
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn file_events(&self) -> Vec<SyncEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, SyncEvent::FileStatusChanged { .. }))
            .collect()
    }

    pub fn states(&self) -> Vec<tidesync_core::types::ServiceState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SyncEvent::ServiceStateUpdated { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn queue_lengths(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SyncEvent::RemoteQueueUpdated { pending } => Some(pending),
                _ => None,
            })
            .collect()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_event(&self, event: &SyncEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub remote: Arc<MemoryRemote>,
    pub local: Arc<RecordingLocalProcessor>,
    pub observer: Arc<RecordingObserver>,
    pub service: SyncService,
}

impl Harness {
    pub fn new(store: MemoryMetadataStore, enabled: bool) -> Self {
        Self::with_remote(MemoryRemote::new(), store, enabled)
    }

    pub fn with_remote(
        remote: Arc<MemoryRemote>,
        store: MemoryMetadataStore,
        enabled: bool,
    ) -> Self {
        init_logging();
        let local = RecordingLocalProcessor::new();
        let observer = RecordingObserver::new();
        let mut service = SyncService::new(remote.clone(), local.clone(), Box::new(store), enabled);
        service.add_observer(observer.clone());
        Self {
            remote,
            local,
            observer,
            service,
        }
    }

    /// Engine with `notes` already incremental at changestamp 0.
    pub fn with_incremental_notes() -> Self {
        let remote = MemoryRemote::new();
        let root = remote.add_directory(None, "tidesync");
        let dir = remote.add_directory(Some(&root), "notes");
        let mut store = MemoryMetadataStore::with_sync_root(root);
        store.seed(notes(), incremental_record(&dir.0, remote.largest().0));
        remote.clear_calls();
        Self::with_remote(remote, store, true)
    }

    pub fn notes_directory(&self) -> ResourceId {
        self.service
            .store()
            .get_directory_id_for_origin(&notes())
            .expect("notes directory")
    }
}
