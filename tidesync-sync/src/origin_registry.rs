//! Origin registry: classification of every registered origin.
//!
//! Each origin maps to one [`OriginRecord`] carrying a single
//! [`OriginClass`], so an origin can never sit in two classes at once.
//! Every classification change bumps an in-memory epoch; asynchronous
//! completions carry an [`OriginTicket`] and are discarded when the ticket
//! no longer matches.

use std::collections::HashMap;

use chrono::Utc;

use tidesync_core::types::{Changestamp, Origin, OriginClass, OriginRecord, ResourceId};

#[derive(Debug, Clone)]
struct Slot {
    record: OriginRecord,
    epoch: u64,
}

/// Snapshot of an origin's classification, taken when async work starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginTicket {
    pub origin: Origin,
    pub class: OriginClass,
    pub epoch: u64,
}

/// Count of origins per class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub pending_batch: usize,
    pub incremental: usize,
    pub disabled: usize,
}

#[derive(Debug, Default)]
pub struct OriginRegistry {
    origins: HashMap<Origin, Slot>,
    next_epoch: u64,
}

impl OriginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records.
    pub fn from_records(records: impl IntoIterator<Item = (Origin, OriginRecord)>) -> Self {
        let mut registry = Self::new();
        for (origin, record) in records {
            let epoch = registry.bump();
            registry.origins.insert(origin, Slot { record, epoch });
        }
        registry
    }

    pub fn contains(&self, origin: &Origin) -> bool {
        self.origins.contains_key(origin)
    }

    pub fn get(&self, origin: &Origin) -> Option<&OriginRecord> {
        self.origins.get(origin).map(|slot| &slot.record)
    }

    pub fn class_of(&self, origin: &Origin) -> Option<OriginClass> {
        self.get(origin).map(|r| r.class)
    }

    /// Record a new pending-batch origin. Returns `None` if already present.
    pub fn insert_pending(
        &mut self,
        origin: Origin,
        directory_id: Option<ResourceId>,
    ) -> Option<&OriginRecord> {
        if self.origins.contains_key(&origin) {
            return None;
        }
        let epoch = self.bump();
        let slot = self.origins.entry(origin).or_insert(Slot {
            record: OriginRecord::pending(directory_id),
            epoch,
        });
        Some(&slot.record)
    }

    /// Move `origin` to `class`. Leaving `Incremental` clears the watermark.
    pub fn reclassify(&mut self, origin: &Origin, class: OriginClass) -> Option<&OriginRecord> {
        let epoch = self.bump();
        let slot = self.origins.get_mut(origin)?;
        slot.record.class = class;
        if class != OriginClass::Incremental {
            slot.record.last_seen = None;
        }
        slot.record.updated_at = Utc::now();
        slot.epoch = epoch;
        Some(&slot.record)
    }

    pub fn set_directory(&mut self, origin: &Origin, id: ResourceId) -> Option<&OriginRecord> {
        let slot = self.origins.get_mut(origin)?;
        slot.record.directory_id = Some(id);
        slot.record.updated_at = Utc::now();
        Some(&slot.record)
    }

    /// Finish a batch sync: the origin becomes incremental at `watermark`.
    pub fn promote_to_incremental(
        &mut self,
        origin: &Origin,
        watermark: Changestamp,
    ) -> Option<&OriginRecord> {
        self.reclassify(origin, OriginClass::Incremental)?;
        let slot = self.origins.get_mut(origin)?;
        slot.record.last_seen = Some(watermark);
        Some(&slot.record)
    }

    /// Raise the watermark of an incremental origin. Never moves it backwards.
    pub fn advance_watermark(
        &mut self,
        origin: &Origin,
        watermark: Changestamp,
    ) -> Option<&OriginRecord> {
        let slot = self.origins.get_mut(origin)?;
        if slot.record.class != OriginClass::Incremental {
            return None;
        }
        if slot.record.last_seen.map_or(true, |seen| seen < watermark) {
            slot.record.last_seen = Some(watermark);
            slot.record.updated_at = Utc::now();
        }
        Some(&slot.record)
    }

    pub fn remove(&mut self, origin: &Origin) -> Option<OriginRecord> {
        self.origins.remove(origin).map(|slot| slot.record)
    }

    pub fn ticket(&self, origin: &Origin) -> Option<OriginTicket> {
        self.origins.get(origin).map(|slot| OriginTicket {
            origin: origin.clone(),
            class: slot.record.class,
            epoch: slot.epoch,
        })
    }

    /// Whether the origin still holds the class and epoch captured in `ticket`.
    pub fn is_current(&self, ticket: &OriginTicket) -> bool {
        self.origins
            .get(&ticket.origin)
            .is_some_and(|slot| slot.record.class == ticket.class && slot.epoch == ticket.epoch)
    }

    /// Origins holding `class`, sorted.
    pub fn origins_in(&self, class: OriginClass) -> Vec<Origin> {
        let mut out: Vec<Origin> = self
            .origins
            .iter()
            .filter(|(_, slot)| slot.record.class == class)
            .map(|(origin, _)| origin.clone())
            .collect();
        out.sort();
        out
    }

    pub fn counts(&self) -> ClassCounts {
        let mut counts = ClassCounts::default();
        for slot in self.origins.values() {
            match slot.record.class {
                OriginClass::PendingBatch => counts.pending_batch += 1,
                OriginClass::Incremental => counts.incremental += 1,
                OriginClass::Disabled => counts.disabled += 1,
            }
        }
        counts
    }

    /// All origins with their records, sorted by origin.
    pub fn snapshot(&self) -> Vec<(Origin, OriginRecord)> {
        let mut out: Vec<(Origin, OriginRecord)> = self
            .origins
            .iter()
            .map(|(o, slot)| (o.clone(), slot.record.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn bump(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes() -> Origin {
        Origin::for_app("notes")
    }

    #[test]
    fn insert_is_pending_and_not_repeatable() {
        let mut registry = OriginRegistry::new();
        assert!(registry.insert_pending(notes(), None).is_some());
        assert!(registry.insert_pending(notes(), None).is_none());
        assert_eq!(registry.class_of(&notes()), Some(OriginClass::PendingBatch));
        assert_eq!(registry.counts().pending_batch, 1);
    }

    #[test]
    fn each_origin_counted_in_exactly_one_class() {
        let mut registry = OriginRegistry::new();
        registry.insert_pending(notes(), None);
        registry.promote_to_incremental(&notes(), Changestamp(10));
        registry.reclassify(&notes(), OriginClass::Disabled);
        let counts = registry.counts();
        assert_eq!(
            (counts.pending_batch, counts.incremental, counts.disabled),
            (0, 0, 1)
        );
    }

    #[test]
    fn reclassify_invalidates_tickets() {
        let mut registry = OriginRegistry::new();
        registry.insert_pending(notes(), None);
        let ticket = registry.ticket(&notes()).expect("ticket");
        assert!(registry.is_current(&ticket));

        registry.reclassify(&notes(), OriginClass::Disabled);
        registry.reclassify(&notes(), OriginClass::PendingBatch);
        assert!(!registry.is_current(&ticket), "same class, newer epoch");

        registry.remove(&notes());
        assert!(registry.ticket(&notes()).is_none());
    }

    #[test]
    fn watermark_only_advances_on_incremental() {
        let mut registry = OriginRegistry::new();
        registry.insert_pending(notes(), None);
        assert!(registry.advance_watermark(&notes(), Changestamp(5)).is_none());

        registry.promote_to_incremental(&notes(), Changestamp(5));
        registry.advance_watermark(&notes(), Changestamp(3));
        assert_eq!(
            registry.get(&notes()).and_then(|r| r.last_seen),
            Some(Changestamp(5))
        );
        registry.advance_watermark(&notes(), Changestamp(9));
        assert_eq!(
            registry.get(&notes()).and_then(|r| r.last_seen),
            Some(Changestamp(9))
        );
    }

    #[test]
    fn leaving_incremental_clears_watermark() {
        let mut registry = OriginRegistry::new();
        registry.insert_pending(notes(), Some(ResourceId::from("folder:1")));
        registry.promote_to_incremental(&notes(), Changestamp(7));
        registry.reclassify(&notes(), OriginClass::PendingBatch);
        let record = registry.get(&notes()).expect("record");
        assert_eq!(record.last_seen, None);
        assert_eq!(record.directory_id, Some(ResourceId::from("folder:1")));
    }

    #[test]
    fn origins_in_is_sorted() {
        let mut registry = OriginRegistry::new();
        registry.insert_pending(Origin::for_app("zeta"), None);
        registry.insert_pending(Origin::for_app("alpha"), None);
        assert_eq!(
            registry.origins_in(OriginClass::PendingBatch),
            vec![Origin::for_app("alpha"), Origin::for_app("zeta")]
        );
    }
}
