use checkin_model::{ParticipantId, ParticipantStatus};
use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Error, Debug)]
pub enum CheckinError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No roster available: remote load failed and no snapshot is cached")]
    NoRosterAvailable,

    #[error("Participant not found: {0}")]
    NotFound(ParticipantId),

    #[error("Refusing status change for participant {id}: {from} -> {to}")]
    InvalidTransition {
        id: ParticipantId,
        from: ParticipantStatus,
        to: ParticipantStatus,
    },

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, CheckinError>;
