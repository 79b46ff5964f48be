use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::ParticipantId;

/// Local acceptance of a scan. Keyed by participant id; at most one per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanRecord {
    pub participant_id: ParticipantId,
    pub scanned_at: DateTime<Utc>,
}

impl ScanRecord {
    pub fn new(participant_id: ParticipantId, scanned_at: DateTime<Utc>) -> Self {
        Self {
            participant_id,
            scanned_at,
        }
    }

    pub fn now(participant_id: ParticipantId) -> Self {
        Self::new(participant_id, Utc::now())
    }
}
