//! Ids checked in locally that the roster authority has not acknowledged.

use checkin_model::ParticipantId;

use crate::{
    error::Result,
    state::{Bucket, StateStore},
};

/// Durable, duplicate-free queue in insertion order.
///
/// Order only fixes the sweep order; nothing else depends on it.
#[derive(Debug)]
pub struct PendingSyncQueue {
    store: StateStore,
    ids: Vec<ParticipantId>,
}

impl PendingSyncQueue {
    pub fn open(store: StateStore) -> Self {
        let mut ids: Vec<ParticipantId> = store.load_or_absent(Bucket::Pending).unwrap_or_default();
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        ids.retain(|id| seen.insert(*id));
        Self { store, ids }
    }

    /// Enqueue `id`. Duplicates are ignored; returns whether it was added.
    pub fn add(&mut self, id: ParticipantId) -> Result<bool> {
        if self.contains(id) {
            return Ok(false);
        }
        let mut next = self.ids.clone();
        next.push(id);
        self.commit(next)?;
        Ok(true)
    }

    /// Drop `id`. No-op if absent; returns whether it was present.
    pub fn remove(&mut self, id: ParticipantId) -> Result<bool> {
        if !self.contains(id) {
            return Ok(false);
        }
        let next: Vec<ParticipantId> = self.ids.iter().copied().filter(|p| *p != id).collect();
        self.commit(next)?;
        Ok(true)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.ids.contains(&id)
    }

    /// Snapshot of the pending ids, oldest first.
    pub fn all(&self) -> Vec<ParticipantId> {
        self.ids.clone()
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.ids.clear();
    }

    fn commit(&mut self, next: Vec<ParticipantId>) -> Result<()> {
        self.store.save(Bucket::Pending, &next)?;
        self.ids = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, StateStore, PendingSyncQueue) {
        let dir = TempDir::new().expect("tempdir");
        let store = StateStore::open(dir.path()).expect("store");
        let queue = PendingSyncQueue::open(store.clone());
        (dir, store, queue)
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let (_dir, _store, mut queue) = open();
        assert!(queue.add(ParticipantId(3)).expect("add"));
        assert!(!queue.add(ParticipantId(3)).expect("add again"));
        assert_eq!(queue.size(), 1);

        assert!(queue.remove(ParticipantId(3)).expect("remove"));
        assert!(!queue.remove(ParticipantId(3)).expect("remove again"));
        assert!(queue.is_empty());
    }

    #[test]
    fn keeps_insertion_order_across_restart() {
        let (_dir, store, mut queue) = open();
        for id in [136, 135, 93] {
            queue.add(ParticipantId(id)).expect("add");
        }
        queue.remove(ParticipantId(135)).expect("remove");

        let reopened = PendingSyncQueue::open(store);
        assert_eq!(reopened.all(), vec![ParticipantId(136), ParticipantId(93)]);
    }
}
