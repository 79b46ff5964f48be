use std::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{error::ModelError, ids::ParticipantId};

/// What a participant is registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Role {
    #[cfg_attr(feature = "serde", serde(alias = "attendee"))]
    Attendee,
    #[cfg_attr(feature = "serde", serde(alias = "volunteer"))]
    Volunteer,
    #[cfg_attr(feature = "serde", serde(alias = "organizer"))]
    Organizer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Attendee => "Attendee",
            Role::Volunteer => "Volunteer",
            Role::Organizer => "Organizer",
        }
    }
}

impl FromStr for Role {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attendee" => Ok(Role::Attendee),
            "volunteer" => Ok(Role::Volunteer),
            "organizer" => Ok(Role::Organizer),
            _ => Err(ModelError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration status as tracked by the roster authority.
///
/// `Attended` is terminal: once a participant has been checked in, nothing
/// moves them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ParticipantStatus {
    Pending,
    Approved,
    Attended,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Approved => "approved",
            ParticipantStatus::Attended => "attended",
        }
    }

    pub fn is_attended(&self) -> bool {
        matches!(self, ParticipantStatus::Attended)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ParticipantStatus::Approved)
    }

    /// Whether `self -> next` is a forward move.
    ///
    /// The check-in engine only ever asks for `-> Attended`; anything that
    /// would leave `Attended` or stay in place is refused.
    pub fn can_transition_to(&self, next: ParticipantStatus) -> bool {
        match (self, next) {
            (ParticipantStatus::Attended, _) => false,
            (current, next) if *current == next => false,
            (_, ParticipantStatus::Attended) => true,
            (ParticipantStatus::Pending, ParticipantStatus::Approved) => true,
            _ => false,
        }
    }
}

impl FromStr for ParticipantStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ParticipantStatus::Pending),
            "approved" => Ok(ParticipantStatus::Approved),
            "attended" => Ok(ParticipantStatus::Attended),
            _ => Err(ModelError::UnknownStatus(s.to_string())),
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered participant, as mirrored from the roster authority.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub email: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub mobile: Option<String>,
    pub role: Role,
    pub status: ParticipantStatus,
}

impl Participant {
    /// Replace-on-write status change. Every other field is carried over.
    pub fn with_status(&self, status: ParticipantStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Participant {
        Participant {
            id: ParticipantId(136),
            name: "John".into(),
            email: "john@gmail.com".into(),
            mobile: Some("9876543210".into()),
            role: Role::Attendee,
            status: ParticipantStatus::Approved,
        }
    }

    #[test]
    fn attended_is_terminal() {
        use ParticipantStatus::*;
        assert!(Approved.can_transition_to(Attended));
        assert!(Pending.can_transition_to(Attended));
        assert!(!Attended.can_transition_to(Approved));
        assert!(!Attended.can_transition_to(Pending));
        assert!(!Attended.can_transition_to(Attended));
        assert!(!Approved.can_transition_to(Pending));
    }

    #[test]
    fn with_status_keeps_other_fields() {
        let before = sample();
        let after = before.with_status(ParticipantStatus::Attended);
        assert_eq!(after.status, ParticipantStatus::Attended);
        assert_eq!(after.id, before.id);
        assert_eq!(after.name, before.name);
        assert_eq!(after.mobile, before.mobile);
        assert_eq!(after.role, before.role);
    }

    #[test]
    fn role_parses_any_case() {
        assert_eq!("organizer".parse::<Role>().unwrap(), Role::Organizer);
        assert_eq!("Volunteer".parse::<Role>().unwrap(), Role::Volunteer);
        assert!("speaker".parse::<Role>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn decodes_roster_record_with_null_mobile() {
        let raw = r#"{
            "id": 8,
            "name": "Kiran Choudhary",
            "email": "kiranchoudhary9180@gmail.com",
            "mobile": null,
            "role": "Volunteer",
            "status": "approved"
        }"#;
        let participant: Participant =
            serde_json::from_str(raw).expect("roster record");
        assert_eq!(participant.id, ParticipantId(8));
        assert_eq!(participant.mobile, None);
        assert_eq!(participant.status, ParticipantStatus::Approved);
    }
}
