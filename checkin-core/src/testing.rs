//! In-memory test doubles.
//!
//! [`StubRosterAuthority`] behaves like a well-mannered roster authority
//! (idempotent mark-attended, empty roster reported as an error) and can be
//! told to fail, hang or go unreachable.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use checkin_model::{Participant, ParticipantId, ParticipantStatus, Role};

use crate::remote::{RemoteError, RemoteResult, RosterAuthority};

/// Build a roster entry with predictable contact details.
pub fn participant(id: u64, status: ParticipantStatus) -> Participant {
    Participant {
        id: ParticipantId(id),
        name: format!("Participant {id}"),
        email: format!("participant{id}@example.com"),
        mobile: None,
        role: Role::Attendee,
        status,
    }
}

#[derive(Debug, Default)]
struct StubState {
    roster: Vec<Participant>,
    roster_failure: Option<RemoteError>,
    mark_failure: Option<RemoteError>,
    /// Number of upcoming mark-attended calls that fail before the stub
    /// starts succeeding again. `None` with `mark_failure` set fails forever.
    mark_failures_remaining: Option<usize>,
    mark_latency: Option<Duration>,
    unreachable: bool,
    roster_calls: usize,
    mark_calls: Vec<ParticipantId>,
    attended: BTreeSet<ParticipantId>,
}

#[derive(Debug, Clone, Default)]
pub struct StubRosterAuthority {
    inner: Arc<Mutex<StubState>>,
}

impl StubRosterAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roster(roster: Vec<Participant>) -> Self {
        let stub = Self::new();
        stub.set_roster(roster);
        stub
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_roster(&self, roster: Vec<Participant>) {
        self.state().roster = roster;
    }

    pub fn fail_roster(&self, err: RemoteError) {
        self.state().roster_failure = Some(err);
    }

    pub fn restore_roster(&self) {
        self.state().roster_failure = None;
    }

    /// Every mark-attended call fails with `err` until [`Self::recover`].
    pub fn fail_mark_attended(&self, err: RemoteError) {
        let mut state = self.state();
        state.mark_failure = Some(err);
        state.mark_failures_remaining = None;
    }

    /// The next `count` mark-attended calls fail with `err`.
    pub fn fail_next_mark_attended(&self, count: usize, err: RemoteError) {
        let mut state = self.state();
        state.mark_failure = Some(err);
        state.mark_failures_remaining = Some(count);
    }

    /// Delay every mark-attended call, to exercise request timeouts.
    pub fn set_mark_latency(&self, latency: Duration) {
        self.state().mark_latency = Some(latency);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    pub fn recover(&self) {
        let mut state = self.state();
        state.mark_failure = None;
        state.mark_failures_remaining = None;
        state.mark_latency = None;
        state.roster_failure = None;
        state.unreachable = false;
    }

    pub fn roster_calls(&self) -> usize {
        self.state().roster_calls
    }

    /// Every mark-attended call received, in arrival order, including
    /// repeats and failures.
    pub fn mark_attended_calls(&self) -> Vec<ParticipantId> {
        self.state().mark_calls.clone()
    }

    /// Ids the authority currently considers attended.
    pub fn attended(&self) -> BTreeSet<ParticipantId> {
        self.state().attended.clone()
    }

    fn next_mark_failure(state: &mut StubState) -> Option<RemoteError> {
        let err = state.mark_failure.clone()?;
        match state.mark_failures_remaining {
            None => Some(err),
            Some(0) => {
                state.mark_failure = None;
                state.mark_failures_remaining = None;
                None
            }
            Some(n) => {
                state.mark_failures_remaining = Some(n - 1);
                Some(err)
            }
        }
    }
}

#[async_trait]
impl RosterAuthority for StubRosterAuthority {
    async fn fetch_roster(&self) -> RemoteResult<Vec<Participant>> {
        let mut state = self.state();
        state.roster_calls += 1;
        if state.unreachable {
            return Err(RemoteError::Transport("authority unreachable".into()));
        }
        if let Some(err) = state.roster_failure.clone() {
            return Err(err);
        }
        if state.roster.is_empty() {
            return Err(RemoteError::EmptyRoster);
        }
        Ok(state.roster.clone())
    }

    async fn mark_attended(&self, id: ParticipantId) -> RemoteResult<()> {
        let latency = {
            let mut state = self.state();
            state.mark_calls.push(id);
            state.mark_latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if state.unreachable {
            return Err(RemoteError::Transport("authority unreachable".into()));
        }
        if let Some(err) = Self::next_mark_failure(&mut state) {
            return Err(err);
        }
        state.attended.insert(id);
        Ok(())
    }

    async fn probe(&self) -> bool {
        !self.state().unreachable
    }
}
