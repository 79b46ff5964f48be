//! The check-in engine: one owner for every piece of local state.
//!
//! [`CheckinEngine`] is driven from a single task. Scans are validated and
//! applied synchronously; network work happens elsewhere (see
//! [`crate::dispatch`]) and comes back as [`DispatchReport`]s.

use std::{collections::HashSet, fmt};

use checkin_model::{ParticipantId, ParticipantStatus, ScanRecord};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    dispatch::{DispatchOutcome, DispatchReport, DispatchTrigger, SweepSummary, SyncDispatcher},
    error::Result,
    ledger::ScanLedger,
    queue::PendingSyncQueue,
    remote::RosterAuthority,
    roster::{RosterCache, RosterLoad},
    state::StateStore,
    stats::{CheckinStats, StatsAggregator},
    validator::{self, ScanDecision},
};

/// A broken relationship between the roster, the ledger and the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Queued for sync but never accepted here.
    PendingNotScanned(ParticipantId),
    /// Accepted here but the roster does not say `attended`.
    ScannedNotAttended(ParticipantId),
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::PendingNotScanned(id) => {
                write!(f, "participant {id} is pending sync but has no scan record")
            }
            InvariantViolation::ScannedNotAttended(id) => {
                write!(f, "participant {id} was scanned but is not attended in the roster")
            }
        }
    }
}

#[derive(Debug)]
pub struct CheckinEngine {
    store: StateStore,
    roster: RosterCache,
    ledger: ScanLedger,
    queue: PendingSyncQueue,
    stats: StatsAggregator,
}

impl CheckinEngine {
    /// Restore persisted state. Never touches the network; the roster is
    /// available only if a snapshot was cached by an earlier run.
    pub fn open(store: StateStore) -> Self {
        let roster = RosterCache::open(store.clone());
        let ledger = ScanLedger::open(store.clone());
        let queue = PendingSyncQueue::open(store.clone());
        let stats = StatsAggregator::new(CheckinStats::derive(&ledger, &queue));

        info!(
            root = ?store.root(),
            cached_roster = roster.len(),
            checked_in = ledger.len(),
            pending = queue.size(),
            "check-in state restored"
        );

        let engine = Self {
            store,
            roster,
            ledger,
            queue,
            stats,
        };
        engine.warn_on_violations("restored");
        engine
    }

    pub async fn load_roster(&mut self, authority: &dyn RosterAuthority) -> Result<RosterLoad> {
        let checked_in: HashSet<ParticipantId> = self.ledger.ids().collect();
        let load = self.roster.load(authority, &checked_in).await?;
        self.warn_on_violations("roster load");
        Ok(load)
    }

    /// Validate one decoded string and, if accepted, record it.
    ///
    /// Acceptance writes roster, then ledger, then queue. If a write fails
    /// part-way the earlier writes stay, which can only leave a participant
    /// attended without a pending entry, never the reverse.
    pub fn process_scan(&mut self, raw: &str) -> Result<ScanDecision> {
        let decision = validator::validate(raw, &self.roster, &self.ledger)?;

        let participant = match decision {
            ScanDecision::Accepted(participant) => participant,
            ScanDecision::Rejected(rejection) => {
                debug!(kind = rejection.kind(), "scan rejected");
                return Ok(ScanDecision::Rejected(rejection));
            }
        };

        let id = participant.id;
        let updated = self.roster.update_status(id, ParticipantStatus::Attended)?;
        self.ledger.insert(ScanRecord::now(id))?;
        self.queue.add(id)?;
        self.stats.refresh(&self.ledger, &self.queue);

        info!(%id, name = %updated.name, "participant checked in");
        self.warn_on_violations("check-in");
        Ok(ScanDecision::Accepted(updated))
    }

    /// Ids awaiting acknowledgement, oldest first.
    pub fn pending_ids(&self) -> Vec<ParticipantId> {
        self.queue.all()
    }

    /// Fold a dispatch result into local state. Returns whether the id left
    /// the pending queue.
    pub fn apply_report(&mut self, report: &DispatchReport) -> Result<bool> {
        let id = report.id;
        match &report.outcome {
            DispatchOutcome::Acknowledged => {
                let removed = self.queue.remove(id)?;
                if removed {
                    self.stats.refresh(&self.ledger, &self.queue);
                    info!(%id, trigger = ?report.trigger, pending = self.queue.size(), "check-in synced");
                } else {
                    debug!(%id, "acknowledgement for an id that is no longer pending");
                }
                Ok(removed)
            }
            DispatchOutcome::Offline => {
                debug!(%id, trigger = ?report.trigger, "check-in kept for later, offline");
                Ok(false)
            }
            DispatchOutcome::Failed(err) if err.is_remote_rejection() => {
                warn!(%id, trigger = ?report.trigger, error = %err, "authority rejected mark-attended, kept pending");
                Ok(false)
            }
            DispatchOutcome::Failed(err) => {
                warn!(%id, trigger = ?report.trigger, error = %err, "authority unreachable, kept pending");
                Ok(false)
            }
        }
    }

    /// Dispatch one id and apply the result in place.
    pub async fn dispatch_now(
        &mut self,
        dispatcher: &SyncDispatcher,
        id: ParticipantId,
    ) -> Result<DispatchReport> {
        let report = dispatcher.dispatch(id, DispatchTrigger::Immediate).await;
        self.apply_report(&report)?;
        Ok(report)
    }

    /// Sweep every pending id and apply each result as it arrives.
    ///
    /// The first storage error stops further bookkeeping and is returned
    /// after the sweep completes; the authority calls are idempotent so the
    /// ids simply go out again next time.
    pub async fn sweep(&mut self, dispatcher: &SyncDispatcher) -> Result<SweepSummary> {
        let ids = self.queue.all();
        if ids.is_empty() {
            return Ok(SweepSummary::default());
        }

        let mut failure = None;
        let summary = dispatcher
            .sweep(&ids, |report| {
                if failure.is_none()
                    && let Err(err) = self.apply_report(&report)
                {
                    failure = Some(err);
                }
            })
            .await;

        match failure {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    pub fn stats(&self) -> CheckinStats {
        self.stats.current()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<CheckinStats> {
        self.stats.subscribe()
    }

    pub fn roster(&self) -> &RosterCache {
        &self.roster
    }

    pub fn ledger(&self) -> &ScanLedger {
        &self.ledger
    }

    pub fn has_roster(&self) -> bool {
        self.roster.is_loaded()
    }

    /// Operator reset: wipe every bucket and all in-memory state. The engine
    /// has no roster afterwards and must be reloaded before scanning.
    pub fn reset(&mut self) -> Result<()> {
        let abandoned = self.queue.size();
        self.store.reset()?;
        self.roster.clear();
        self.ledger.clear();
        self.queue.clear();
        self.stats.refresh(&self.ledger, &self.queue);

        if abandoned > 0 {
            warn!(abandoned, "operator reset dropped unsynced check-ins");
        } else {
            info!("operator reset");
        }
        Ok(())
    }

    /// Every violated relationship between roster, ledger and queue.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations: Vec<InvariantViolation> = self
            .queue
            .all()
            .into_iter()
            .filter(|id| !self.ledger.contains(*id))
            .map(InvariantViolation::PendingNotScanned)
            .collect();

        if self.roster.is_loaded() {
            violations.extend(
                self.ledger
                    .ids()
                    .filter(|id| match self.roster.lookup(*id) {
                        Ok(participant) => !participant.status.is_attended(),
                        Err(_) => true,
                    })
                    .map(InvariantViolation::ScannedNotAttended),
            );
        }
        violations
    }

    /// State restored from a damaged store can disagree with itself; that is
    /// logged, never fatal.
    fn warn_on_violations(&self, stage: &'static str) {
        for violation in self.check_invariants() {
            warn!(%violation, stage, "check-in state is inconsistent");
        }
    }
}
