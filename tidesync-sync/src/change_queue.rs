//! Remote change queue: latest admitted remote state per file.
//!
//! Holds at most one [`RemoteFileState`] per [`FileUrl`] and hands them out
//! in changestamp order (FIFO among equal changestamps). Admission resolves
//! out-of-order, duplicate and inconsistent updates before they can reach the
//! apply pipeline.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tidesync_core::types::{Changestamp, FileUrl, Origin, RemoteChange, RemoteFileState};

/// Why an incoming update was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Changestamp at or below the stored one.
    Stale,
    /// Deletion of a path whose latest known state is already deleted.
    RedundantDeletion,
    /// Live entry held under a different resource id.
    Inconsistent,
    /// Same resource and same content fingerprint.
    Duplicate,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Stale => write!(f, "stale"),
            Rejection::RedundantDeletion => write!(f, "redundant deletion"),
            Rejection::Inconsistent => write!(f, "inconsistent resource id"),
            Rejection::Duplicate => write!(f, "duplicate content"),
        }
    }
}

/// Outcome of [`RemoteChangeQueue::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_accepted(self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Decide whether `incoming` may replace `current`.
pub fn evaluate(current: Option<&RemoteFileState>, incoming: &RemoteFileState) -> Admission {
    let Some(current) = current else {
        return Admission::Accepted;
    };
    if incoming.changestamp <= current.changestamp {
        return Admission::Rejected(Rejection::Stale);
    }
    if current.is_deleted {
        return if incoming.is_deleted {
            Admission::Rejected(Rejection::RedundantDeletion)
        } else {
            Admission::Accepted
        };
    }
    if current.resource_id != incoming.resource_id {
        return Admission::Rejected(Rejection::Inconsistent);
    }
    if incoming.is_deleted || current.fingerprint != incoming.fingerprint {
        Admission::Accepted
    } else {
        Admission::Rejected(Rejection::Duplicate)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    state: RemoteFileState,
    seq: u64,
}

/// Pending remote changes keyed by file.
#[derive(Debug, Default)]
pub struct RemoteChangeQueue {
    entries: HashMap<FileUrl, Slot>,
    // (changestamp, admission sequence) gives FIFO among ties.
    order: BTreeSet<(Changestamp, u64, FileUrl)>,
    next_seq: u64,
}

impl RemoteChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, url: &FileUrl) -> Option<&RemoteFileState> {
        self.entries.get(url).map(|slot| &slot.state)
    }

    /// Admit `state` for `url`, replacing the stored entry on acceptance.
    pub fn admit(&mut self, url: FileUrl, state: RemoteFileState) -> Admission {
        let admission = evaluate(self.get(&url), &state);
        match admission {
            Admission::Accepted => {
                tracing::debug!(
                    "queue: admitted {url} (resource {}, changestamp {}, deleted {})",
                    state.resource_id,
                    state.changestamp,
                    state.is_deleted
                );
                self.replace(url, state);
            }
            Admission::Rejected(Rejection::Inconsistent) => {
                tracing::warn!(
                    "queue: dropped {url}: resource {} conflicts with queued resource {}",
                    state.resource_id,
                    self.get(&url)
                        .map(|s| s.resource_id.to_string())
                        .unwrap_or_default()
                );
            }
            Admission::Rejected(reason) => {
                tracing::debug!(
                    "queue: rejected {url} at changestamp {}: {reason}",
                    state.changestamp
                );
            }
        }
        admission
    }

    /// Next change to apply, without removing it.
    pub fn peek_next(&self) -> Option<RemoteChange> {
        let (_, _, url) = self.order.first()?;
        let slot = self.entries.get(url)?;
        Some(RemoteChange {
            url: url.clone(),
            state: slot.state.clone(),
        })
    }

    /// Remove the entry for `url` if it is still the one at `changestamp`.
    ///
    /// Returns `false` when a newer change replaced it in the meantime.
    pub fn complete(&mut self, url: &FileUrl, changestamp: Changestamp) -> bool {
        match self.entries.get(url) {
            Some(slot) if slot.state.changestamp == changestamp => {
                self.remove(url);
                true
            }
            _ => false,
        }
    }

    /// Every queued change in apply order.
    pub fn snapshot(&self) -> Vec<RemoteChange> {
        self.order
            .iter()
            .filter_map(|(_, _, url)| {
                let slot = self.entries.get(url)?;
                Some(RemoteChange {
                    url: url.clone(),
                    state: slot.state.clone(),
                })
            })
            .collect()
    }

    /// Discard every queued change for `origin`; returns how many were dropped.
    pub fn remove_origin(&mut self, origin: &Origin) -> usize {
        let urls: Vec<FileUrl> = self
            .entries
            .keys()
            .filter(|url| &url.origin == origin)
            .cloned()
            .collect();
        for url in &urls {
            self.remove(url);
        }
        urls.len()
    }

    fn replace(&mut self, url: FileUrl, state: RemoteFileState) {
        self.remove(&url);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((state.changestamp, seq, url.clone()));
        self.entries.insert(url, Slot { state, seq });
    }

    fn remove(&mut self, url: &FileUrl) {
        if let Some(slot) = self.entries.remove(url) {
            self.order
                .remove(&(slot.state.changestamp, slot.seq, url.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidesync_core::types::{Fingerprint, ResourceId};

    fn url(path: &str) -> FileUrl {
        FileUrl::new(Origin::for_app("notes"), path)
    }

    fn state(id: &str, deleted: bool, md5: &str, cs: i64) -> RemoteFileState {
        RemoteFileState {
            resource_id: ResourceId::from(id),
            is_deleted: deleted,
            fingerprint: Fingerprint::from(md5),
            changestamp: Changestamp(cs),
        }
    }

    #[test]
    fn empty_queue_has_nothing_next() {
        let queue = RemoteChangeQueue::new();
        assert!(queue.is_empty());
        assert!(queue.peek_next().is_none());
    }

    #[test]
    fn same_admission_twice_is_rejected_as_stale() {
        let mut queue = RemoteChangeQueue::new();
        let s = state("file:a", false, "m1", 5);
        assert!(queue.admit(url("a"), s.clone()).is_accepted());
        assert_eq!(
            queue.admit(url("a"), s.clone()),
            Admission::Rejected(Rejection::Stale)
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(&url("a")), Some(&s));
    }

    #[test]
    fn peek_orders_by_changestamp_then_fifo() {
        let mut queue = RemoteChangeQueue::new();
        queue.admit(url("late"), state("file:1", false, "m", 9));
        queue.admit(url("tie-first"), state("file:2", false, "m", 3));
        queue.admit(url("tie-second"), state("file:3", false, "m", 3));

        let mut seen = Vec::new();
        while let Some(next) = queue.peek_next() {
            assert!(queue.complete(&next.url, next.state.changestamp));
            seen.push(next.url.path.display().to_string());
        }
        assert_eq!(seen, ["tie-first", "tie-second", "late"]);
    }

    #[test]
    fn replacing_an_entry_moves_it_in_order() {
        let mut queue = RemoteChangeQueue::new();
        queue.admit(url("a"), state("file:a", false, "m1", 1));
        queue.admit(url("b"), state("file:b", false, "m1", 2));
        queue.admit(url("a"), state("file:a", false, "m2", 3));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek_next().map(|c| c.url), Some(url("b")));
    }

    #[test]
    fn snapshot_lists_entries_in_apply_order() {
        let mut queue = RemoteChangeQueue::new();
        queue.admit(url("b"), state("file:b", true, "", 7));
        queue.admit(url("a"), state("file:a", false, "m", 2));

        let snapshot = queue.snapshot();
        let urls: Vec<FileUrl> = snapshot.iter().map(|c| c.url.clone()).collect();
        assert_eq!(urls, vec![url("a"), url("b")]);
        assert!(snapshot[1].state.is_deleted);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn complete_ignores_superseded_entry() {
        let mut queue = RemoteChangeQueue::new();
        queue.admit(url("a"), state("file:a", false, "m1", 1));
        queue.admit(url("a"), state("file:a", false, "m2", 4));
        assert!(!queue.complete(&url("a"), Changestamp(1)));
        assert_eq!(queue.len(), 1);
        assert!(queue.complete(&url("a"), Changestamp(4)));
        assert!(queue.is_empty());
    }

    #[test]
    fn remove_origin_only_touches_that_origin() {
        let mut queue = RemoteChangeQueue::new();
        let other = FileUrl::new(Origin::for_app("music"), "song.mp3");
        queue.admit(url("a"), state("file:a", false, "m", 1));
        queue.admit(url("b"), state("file:b", false, "m", 2));
        queue.admit(other.clone(), state("file:c", false, "m", 3));

        assert_eq!(queue.remove_origin(&Origin::for_app("notes")), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_next().map(|c| c.url), Some(other));
    }

    #[test]
    fn deleted_then_recreated_under_new_id() {
        let current = state("file:a", true, "", 6);
        assert_eq!(
            evaluate(Some(&current), &state("file:b", false, "m", 8)),
            Admission::Accepted
        );
        assert_eq!(
            evaluate(Some(&current), &state("file:c", true, "", 7)),
            Admission::Rejected(Rejection::RedundantDeletion)
        );
    }

    #[test]
    fn live_entry_rejects_other_resource_even_when_deleted() {
        let current = state("file:a", false, "m", 2);
        assert_eq!(
            evaluate(Some(&current), &state("file:b", true, "", 5)),
            Admission::Rejected(Rejection::Inconsistent)
        );
        assert_eq!(
            evaluate(Some(&current), &state("file:a", true, "", 5)),
            Admission::Accepted
        );
    }
}
