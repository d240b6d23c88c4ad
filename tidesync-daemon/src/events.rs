//! Bridge from engine observer callbacks to a tokio broadcast channel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use tidesync_core::types::SyncAction;
use tidesync_sync::{SyncEvent, SyncObserver};

/// Forwards engine events to subscribers and logs them.
pub struct BroadcastObserver {
    tx: broadcast::Sender<SyncEvent>,
}

impl BroadcastObserver {
    pub fn new(tx: broadcast::Sender<SyncEvent>) -> Self {
        Self { tx }
    }
}

impl SyncObserver for BroadcastObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::ServiceStateUpdated { state, description } => {
                tracing::info!(state = %state, reason = %description, "service state changed");
            }
            SyncEvent::FileStatusChanged { url, action, .. } => {
                tracing::info!(file = %url, action = %action, "remote change applied");
            }
            SyncEvent::RemoteQueueUpdated { pending } => {
                tracing::debug!(pending, "remote queue updated");
            }
        }
        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
    }
}

/// Running counters shown by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStats {
    pub files_added: u64,
    pub files_updated: u64,
    pub files_deleted: u64,
    pub last_applied_at_unix: u64,
}

impl EventStats {
    pub fn record(&mut self, event: &SyncEvent, now_unix: u64) {
        let SyncEvent::FileStatusChanged { action, .. } = event else {
            return;
        };
        match action {
            SyncAction::Added => self.files_added += 1,
            SyncAction::Updated => self.files_updated += 1,
            SyncAction::Deleted => self.files_deleted += 1,
            SyncAction::None => {}
        }
        self.last_applied_at_unix = now_unix;
    }
}

/// Fold broadcast events into `stats` until the channel closes or shutdown.
pub async fn stats_task(
    stats: Arc<RwLock<EventStats>>,
    mut events: broadcast::Receiver<SyncEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), crate::DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events.recv() => match event {
                Ok(event) => stats.write().await.record(&event, crate::runtime::unix_seconds_now()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stats lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidesync_core::types::{FileStatus, FileUrl, Origin, SyncDirection};

    fn applied(action: SyncAction) -> SyncEvent {
        SyncEvent::FileStatusChanged {
            url: FileUrl::new(Origin::for_app("notes"), "a.txt"),
            status: FileStatus::Synced,
            action,
            direction: SyncDirection::RemoteToLocal,
        }
    }

    #[test]
    fn stats_count_file_actions_only() {
        let mut stats = EventStats::default();
        stats.record(&applied(SyncAction::Added), 10);
        stats.record(&applied(SyncAction::Deleted), 11);
        stats.record(&SyncEvent::RemoteQueueUpdated { pending: 4 }, 12);
        assert_eq!(stats.files_added, 1);
        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.last_applied_at_unix, 11);
    }

    #[tokio::test]
    async fn observer_events_reach_stats_task() {
        let (tx, rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let stats = Arc::new(RwLock::new(EventStats::default()));
        let task = tokio::spawn(stats_task(stats.clone(), rx, shutdown_rx));

        let observer = BroadcastObserver::new(tx.clone());
        observer.on_event(&applied(SyncAction::Updated));
        drop(observer);
        drop(tx);
        task.await.expect("join").expect("stats task");
        drop(shutdown_tx);

        assert_eq!(stats.read().await.files_updated, 1);
    }
}
