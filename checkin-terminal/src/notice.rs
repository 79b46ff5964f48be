//! What the operator sees after each decision.

use std::fmt;

use checkin_core::{CheckedInVia, CheckinStats, RosterLoad, RosterSource, ScanDecision, ScanRejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Warning,
    Error,
}

impl Tone {
    fn marker(self) -> &'static str {
        match self {
            Tone::Success => "[ok]",
            Tone::Warning => "[!!]",
            Tone::Error => "[xx]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorNotice {
    pub title: String,
    pub text: String,
    pub tone: Tone,
}

impl OperatorNotice {
    fn new(tone: Tone, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            tone,
        }
    }

    /// `online` is the connectivity state at the moment of acceptance; it
    /// only changes the wording.
    pub fn for_decision(decision: &ScanDecision, online: bool) -> Self {
        match decision {
            ScanDecision::Accepted(participant) => Self::new(
                Tone::Success,
                format!("Welcome {}!", participant.name),
                if online {
                    "Successfully checked in. Data synced!"
                } else {
                    "Successfully checked in. Will sync when online."
                },
            ),
            ScanDecision::Rejected(rejection) => Self::for_rejection(rejection),
        }
    }

    fn for_rejection(rejection: &ScanRejection) -> Self {
        match rejection {
            ScanRejection::InvalidFormat(_) => Self::new(
                Tone::Error,
                "Invalid QR Code",
                "This code is not a valid participant badge.",
            ),
            ScanRejection::ParticipantNotFound(id) => Self::new(
                Tone::Error,
                "Participant Not Found",
                format!("No participant found with ID: {id}"),
            ),
            ScanRejection::AlreadyCheckedIn {
                participant,
                via: CheckedInVia::ThisTerminal,
            } => Self::new(
                Tone::Warning,
                "Already Checked In",
                format!("{} has already been checked in.", participant.name),
            ),
            ScanRejection::AlreadyCheckedIn {
                participant,
                via: CheckedInVia::Roster,
            } => Self::new(
                Tone::Warning,
                "Ticket Already Scanned",
                format!("{} has already attended.", participant.name),
            ),
            ScanRejection::NotApproved(participant) => Self::new(
                Tone::Error,
                "Access Denied",
                format!("{} is not approved for entry.", participant.name),
            ),
        }
    }

    pub fn no_roster() -> Self {
        Self::new(
            Tone::Error,
            "Data Loading Failed",
            "Could not load participant data. Check the connection and use !refresh.",
        )
    }

    pub fn roster_loaded(load: &RosterLoad) -> Self {
        match load.source {
            RosterSource::Remote => Self::new(
                Tone::Success,
                "Roster Loaded",
                format!("{} participants loaded.", load.participants),
            ),
            RosterSource::Cached => Self::new(
                Tone::Warning,
                "Using Cached Roster",
                format!(
                    "Server unavailable; {} participants loaded from this device.",
                    load.participants
                ),
            ),
        }
    }

    pub fn reset_done() -> Self {
        Self::new(Tone::Warning, "Storage Cleared", "All local check-in data was removed.")
    }

    pub fn storage_failure() -> Self {
        Self::new(
            Tone::Error,
            "Storage Error",
            "The check-in could not be saved on this device. Please scan again.",
        )
    }

    pub fn connectivity(online: bool) -> Self {
        if online {
            Self::new(Tone::Success, "Online", "Pending check-ins will sync now.")
        } else {
            Self::new(Tone::Warning, "Offline", "Check-ins will be stored and synced later.")
        }
    }

    pub fn unknown_command(command: &str) -> Self {
        Self::new(
            Tone::Warning,
            "Unknown Command",
            format!(
                "`!{command}` is not a command. Try !refresh, !reset, !stats, !online, !offline or !quit."
            ),
        )
    }
}

impl fmt::Display for OperatorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.tone.marker(), self.title, self.text)
    }
}

/// One-line counter display.
pub fn stats_line(stats: &CheckinStats) -> String {
    format!(
        "Checked in: {} | Pending sync: {}",
        stats.checked_in, stats.pending
    )
}
