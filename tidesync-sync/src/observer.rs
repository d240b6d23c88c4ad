//! Observer wiring for engine events.

use std::sync::Arc;

use serde::Serialize;

use tidesync_core::types::{FileStatus, FileUrl, ServiceState, SyncAction, SyncDirection};

/// Event broadcast after a committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    RemoteQueueUpdated {
        pending: usize,
    },
    ServiceStateUpdated {
        state: ServiceState,
        description: String,
    },
    FileStatusChanged {
        url: FileUrl,
        status: FileStatus,
        action: SyncAction,
        direction: SyncDirection,
    },
}

/// Listener invoked synchronously on the engine's context.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

#[derive(Default, Clone)]
pub struct ObserverList {
    observers: Vec<Arc<dyn SyncObserver>>,
}

impl ObserverList {
    pub fn add(&mut self, observer: Arc<dyn SyncObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify(&self, event: SyncEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.observers.len())
            .finish()
    }
}
