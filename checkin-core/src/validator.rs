//! Scan validation pipeline.
//!
//! Each decoded string is judged on its own by an ordered list of checks;
//! the first failing check decides the outcome. Validation never mutates
//! anything. Applying an accepted scan is [`crate::engine::CheckinEngine`]'s
//! job.

use checkin_model::{Participant, ParticipantId};

use crate::{
    error::CheckinError,
    ledger::ScanLedger,
    payload::{PayloadError, ScanPayload},
    roster::RosterCache,
};

/// Why a participant counts as already checked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckedInVia {
    /// Accepted earlier at this terminal.
    ThisTerminal,
    /// Roster already says `attended` (another path got there first).
    Roster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanRejection {
    InvalidFormat(PayloadError),
    ParticipantNotFound(ParticipantId),
    AlreadyCheckedIn {
        participant: Participant,
        via: CheckedInVia,
    },
    NotApproved(Participant),
}

impl ScanRejection {
    /// Short stable tag, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanRejection::InvalidFormat(_) => "invalid_format",
            ScanRejection::ParticipantNotFound(_) => "participant_not_found",
            ScanRejection::AlreadyCheckedIn { .. } => "already_checked_in",
            ScanRejection::NotApproved(_) => "not_approved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDecision {
    Accepted(Participant),
    Rejected(ScanRejection),
}

impl ScanDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ScanDecision::Accepted(_))
    }
}

/// Run the check pipeline for one decoded string.
///
/// Fails only when there is no roster to validate against; every other
/// problem is a [`ScanRejection`].
pub fn validate(
    raw: &str,
    roster: &RosterCache,
    ledger: &ScanLedger,
) -> Result<ScanDecision, CheckinError> {
    if !roster.is_loaded() {
        return Err(CheckinError::NoRosterAvailable);
    }

    let payload = match ScanPayload::parse(raw) {
        Ok(payload) => payload,
        Err(err) => return Ok(ScanDecision::Rejected(ScanRejection::InvalidFormat(err))),
    };

    let participant = match roster.lookup(payload.id) {
        Ok(participant) => participant,
        Err(CheckinError::NotFound(id)) => {
            return Ok(ScanDecision::Rejected(ScanRejection::ParticipantNotFound(id)));
        }
        Err(err) => return Err(err),
    };

    if ledger.contains(participant.id) {
        return Ok(ScanDecision::Rejected(ScanRejection::AlreadyCheckedIn {
            participant: participant.clone(),
            via: CheckedInVia::ThisTerminal,
        }));
    }

    if participant.status.is_attended() {
        return Ok(ScanDecision::Rejected(ScanRejection::AlreadyCheckedIn {
            participant: participant.clone(),
            via: CheckedInVia::Roster,
        }));
    }

    // The badge may carry its own approval, independent of the cached status.
    if !participant.status.is_approved() && !payload.asserts_approval() {
        return Ok(ScanDecision::Rejected(ScanRejection::NotApproved(
            participant.clone(),
        )));
    }

    Ok(ScanDecision::Accepted(participant.clone()))
}
