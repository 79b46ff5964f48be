//! Local mirror of the participant roster.

use std::collections::{HashMap, HashSet};

use checkin_model::{Participant, ParticipantId, ParticipantStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{CheckinError, Result},
    remote::{RemoteError, RosterAuthority},
    state::{Bucket, StateStore},
};

const ROSTER_SCHEMA_VERSION: u32 = 1;

/// Where the roster currently in memory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterSource {
    Remote,
    Cached,
}

/// Result of [`RosterCache::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterLoad {
    pub source: RosterSource,
    pub participants: usize,
    /// Set when the remote load failed and the cached snapshot was used.
    pub remote_error: Option<RemoteError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RosterSnapshotFile {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    participants: Vec<Participant>,
}

/// Id-indexed snapshot. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, Default)]
struct RosterSnapshot {
    order: Vec<ParticipantId>,
    by_id: HashMap<ParticipantId, Participant>,
}

impl RosterSnapshot {
    fn from_participants(participants: Vec<Participant>) -> std::result::Result<Self, ParticipantId> {
        let mut snapshot = Self {
            order: Vec::with_capacity(participants.len()),
            by_id: HashMap::with_capacity(participants.len()),
        };
        for participant in participants {
            let id = participant.id;
            if snapshot.by_id.insert(id, participant).is_some() {
                return Err(id);
            }
            snapshot.order.push(id);
        }
        Ok(snapshot)
    }

    fn participants(&self) -> impl Iterator<Item = &Participant> + '_ {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    fn to_file(&self) -> RosterSnapshotFile {
        RosterSnapshotFile {
            schema_version: ROSTER_SCHEMA_VERSION,
            saved_at: Utc::now(),
            participants: self.participants().cloned().collect(),
        }
    }
}

/// Authoritative local roster.
///
/// Every read sees a complete snapshot: loads and status updates build the
/// next snapshot off to the side, persist it, and only then swap it in.
#[derive(Debug)]
pub struct RosterCache {
    store: StateStore,
    snapshot: Option<RosterSnapshot>,
}

impl RosterCache {
    /// Restore the persisted snapshot, if any. Never touches the network.
    pub fn open(store: StateStore) -> Self {
        let snapshot = read_persisted(&store);
        Self { store, snapshot }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.order.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the snapshot with the authority's roster, falling back to the
    /// last persisted snapshot when the authority is unreachable or answers
    /// with nothing usable.
    ///
    /// `checked_in` lists ids accepted at this terminal. A fresh remote roster
    /// may not have caught up with them yet, so they are kept `attended`
    /// (and kept at all, if the authority dropped them).
    pub async fn load(
        &mut self,
        authority: &dyn RosterAuthority,
        checked_in: &HashSet<ParticipantId>,
    ) -> Result<RosterLoad> {
        let remote_error = match authority.fetch_roster().await {
            Ok(participants) => match self.adopt_remote(participants, checked_in) {
                Ok(count) => {
                    info!(participants = count, "roster loaded from authority");
                    return Ok(RosterLoad {
                        source: RosterSource::Remote,
                        participants: count,
                        remote_error: None,
                    });
                }
                Err(err) => err,
            },
            Err(err) => err,
        };

        warn!(error = %remote_error, "roster load from authority failed; trying cached snapshot");

        if self.snapshot.is_none() {
            self.snapshot = read_persisted(&self.store);
        }

        match &self.snapshot {
            Some(snapshot) => {
                info!(participants = snapshot.order.len(), "using cached roster snapshot");
                Ok(RosterLoad {
                    source: RosterSource::Cached,
                    participants: snapshot.order.len(),
                    remote_error: Some(remote_error),
                })
            }
            None => Err(CheckinError::NoRosterAvailable),
        }
    }

    fn adopt_remote(
        &mut self,
        participants: Vec<Participant>,
        checked_in: &HashSet<ParticipantId>,
    ) -> std::result::Result<usize, RemoteError> {
        if participants.is_empty() {
            return Err(RemoteError::EmptyRoster);
        }

        let mut next = RosterSnapshot::from_participants(participants).map_err(|id| {
            RemoteError::Malformed(format!("roster lists participant {id} more than once"))
        })?;

        for id in checked_in {
            match next.by_id.get_mut(id) {
                Some(participant) if !participant.status.is_attended() => {
                    *participant = participant.with_status(ParticipantStatus::Attended);
                }
                Some(_) => {}
                None => {
                    let carried = self
                        .snapshot
                        .as_ref()
                        .and_then(|s| s.by_id.get(id))
                        .map(|p| p.with_status(ParticipantStatus::Attended));
                    if let Some(participant) = carried {
                        warn!(%id, "authority roster dropped a locally checked-in participant; keeping local record");
                        next.order.push(*id);
                        next.by_id.insert(*id, participant);
                    }
                }
            }
        }

        if let Err(err) = self.store.save(Bucket::Roster, &next.to_file()) {
            warn!(error = %err, "failed to persist roster snapshot; continuing with in-memory copy");
        }

        let count = next.order.len();
        self.snapshot = Some(next);
        Ok(count)
    }

    pub fn lookup(&self, id: ParticipantId) -> Result<&Participant> {
        let snapshot = self.snapshot.as_ref().ok_or(CheckinError::NoRosterAvailable)?;
        snapshot.by_id.get(&id).ok_or(CheckinError::NotFound(id))
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> + '_ {
        self.snapshot.iter().flat_map(|s| s.participants())
    }

    /// Replace one participant's record with a copy carrying `status`, then
    /// persist the whole roster. Only forward transitions are accepted.
    pub fn update_status(
        &mut self,
        id: ParticipantId,
        status: ParticipantStatus,
    ) -> Result<Participant> {
        let current = self.lookup(id)?;
        if !current.status.can_transition_to(status) {
            return Err(CheckinError::InvalidTransition {
                id,
                from: current.status,
                to: status,
            });
        }
        let updated = current.with_status(status);

        let Some(snapshot) = self.snapshot.as_ref() else {
            return Err(CheckinError::NoRosterAvailable);
        };
        let mut next = snapshot.clone();
        next.by_id.insert(id, updated.clone());

        self.store.save(Bucket::Roster, &next.to_file())?;
        self.snapshot = Some(next);
        Ok(updated)
    }

    pub(crate) fn clear(&mut self) {
        self.snapshot = None;
    }
}

fn read_persisted(store: &StateStore) -> Option<RosterSnapshot> {
    let file: RosterSnapshotFile = store.load_or_absent(Bucket::Roster)?;
    if file.schema_version != ROSTER_SCHEMA_VERSION {
        warn!(
            found = file.schema_version,
            expected = ROSTER_SCHEMA_VERSION,
            "ignoring roster snapshot with unknown schema version"
        );
        return None;
    }
    match RosterSnapshot::from_participants(file.participants) {
        Ok(snapshot) => Some(snapshot),
        Err(id) => {
            warn!(%id, "ignoring roster snapshot with duplicate participant");
            None
        }
    }
}
