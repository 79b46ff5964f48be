//! Scans accepted at this terminal.

use std::collections::HashSet;

use checkin_model::{ParticipantId, ScanRecord};
use tracing::warn;

use crate::{
    error::Result,
    state::{Bucket, StateStore},
};

/// Append-only set of accepted scans, keyed by participant id.
#[derive(Debug)]
pub struct ScanLedger {
    store: StateStore,
    records: Vec<ScanRecord>,
    ids: HashSet<ParticipantId>,
}

impl ScanLedger {
    /// Restore from the `scanned` bucket; an absent bucket starts empty.
    pub fn open(store: StateStore) -> Self {
        let records: Vec<ScanRecord> = store.load_or_absent(Bucket::Scanned).unwrap_or_default();

        let mut ledger = Self {
            store,
            records: Vec::with_capacity(records.len()),
            ids: HashSet::with_capacity(records.len()),
        };
        for record in records {
            if ledger.ids.insert(record.participant_id) {
                ledger.records.push(record);
            } else {
                warn!(id = %record.participant_id, "dropping duplicate persisted scan record");
            }
        }
        ledger
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.ids.contains(&id)
    }

    /// Record an accepted scan and persist. Returns `false` (and writes
    /// nothing) if the id was already recorded.
    pub fn insert(&mut self, record: ScanRecord) -> Result<bool> {
        if self.contains(record.participant_id) {
            return Ok(false);
        }

        let mut next = self.records.clone();
        next.push(record);
        self.store.save(Bucket::Scanned, &next)?;

        self.ids.insert(record.participant_id);
        self.records = next;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ScanRecord] {
        &self.records
    }

    pub fn ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.records.iter().map(|r| r.participant_id)
    }

    /// Forget the in-memory view. Used after the store has been reset.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
    }
}
