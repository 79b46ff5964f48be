//! The remote roster authority.
//!
//! The engine only needs three things from the outside world: the full
//! roster, an idempotent "mark attended" call, and a cheap reachability
//! check. Everything network-shaped sits behind [`RosterAuthority`] so the
//! engine can be exercised against the in-memory stub enabled by the
//! `testing` feature.

pub mod http;

pub use http::*;

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use checkin_model::{Participant, ParticipantId};
use thiserror::Error;

/// Failures talking to the roster authority. All of them are retryable from
/// the engine's point of view; the variants exist for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("remote responded with status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("remote roster is empty")]
    EmptyRoster,
}

impl RemoteError {
    /// Whether the authority answered at all (as opposed to the request never
    /// completing).
    pub fn is_remote_rejection(&self) -> bool {
        matches!(
            self,
            RemoteError::Status(_) | RemoteError::Malformed(_) | RemoteError::EmptyRoster
        )
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[async_trait]
pub trait RosterAuthority: Send + Sync + Debug {
    /// Fetch every registered participant. An empty list is an error.
    async fn fetch_roster(&self) -> RemoteResult<Vec<Participant>>;

    /// Record attendance for `id`. Must be safe to repeat for the same id.
    async fn mark_attended(&self, id: ParticipantId) -> RemoteResult<()>;

    /// Cheap reachability check backing the connectivity monitor.
    async fn probe(&self) -> bool;
}
