//! Delivery of pending check-ins to the roster authority.
//!
//! The dispatcher never touches local state. It produces
//! [`DispatchReport`]s; the engine applies them through
//! [`crate::engine::CheckinEngine::apply_report`]. That split keeps every
//! mutation on the engine's owner while network calls run on spawned tasks.

use std::{sync::Arc, time::Duration};

use checkin_model::ParticipantId;
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    connectivity::Connectivity,
    remote::{RemoteError, RosterAuthority},
};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PACING: Duration = Duration::from_millis(100);
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Period between background sweeps.
    pub sweep_interval: Duration,
    /// Gap between consecutive calls within one sweep.
    pub pacing: Duration,
    /// Upper bound for a single mark-attended call.
    pub call_timeout: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            pacing: DEFAULT_PACING,
            call_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTrigger {
    /// Right after a scan was accepted.
    Immediate,
    /// Part of a retry sweep.
    Sweep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Acknowledged,
    /// Skipped without a network call.
    Offline,
    Failed(RemoteError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub id: ParticipantId,
    pub trigger: DispatchTrigger,
    pub outcome: DispatchOutcome,
}

impl DispatchReport {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Acknowledged)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub attempted: usize,
    pub acknowledged: usize,
    pub failed: usize,
    /// Ids left untouched because the terminal went (or was) offline.
    pub skipped: usize,
}

/// Messages produced by spawned dispatch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Report(DispatchReport),
    SweepFinished(SweepSummary),
}

#[derive(Debug, Clone)]
pub struct SyncDispatcher {
    authority: Arc<dyn RosterAuthority>,
    connectivity: Connectivity,
    policy: DispatchPolicy,
}

impl SyncDispatcher {
    pub fn new(
        authority: Arc<dyn RosterAuthority>,
        connectivity: Connectivity,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            authority,
            connectivity,
            policy,
        }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Try to deliver one check-in.
    pub async fn dispatch(&self, id: ParticipantId, trigger: DispatchTrigger) -> DispatchReport {
        if !self.connectivity.is_online() {
            debug!(%id, ?trigger, "offline, leaving check-in queued");
            return DispatchReport {
                id,
                trigger,
                outcome: DispatchOutcome::Offline,
            };
        }

        let outcome = match timeout(self.policy.call_timeout, self.authority.mark_attended(id)).await
        {
            Ok(Ok(())) => DispatchOutcome::Acknowledged,
            Ok(Err(err)) => DispatchOutcome::Failed(err),
            Err(_) => DispatchOutcome::Failed(RemoteError::TimedOut(self.policy.call_timeout)),
        };

        if let DispatchOutcome::Failed(err) = &outcome {
            warn!(%id, ?trigger, error = %err, "mark-attended failed, will retry");
        }

        DispatchReport {
            id,
            trigger,
            outcome,
        }
    }

    /// Deliver `ids` one at a time, pausing [`DispatchPolicy::pacing`]
    /// between calls. Stops early once the terminal is offline; remaining
    /// ids stay queued for the next sweep.
    pub async fn sweep<F>(&self, ids: &[ParticipantId], mut on_report: F) -> SweepSummary
    where
        F: FnMut(DispatchReport),
    {
        let mut summary = SweepSummary::default();

        for (index, &id) in ids.iter().enumerate() {
            if !self.connectivity.is_online() {
                summary.skipped = ids.len() - index;
                debug!(skipped = summary.skipped, "sweep stopped, terminal offline");
                break;
            }
            if index > 0 {
                tokio::time::sleep(self.policy.pacing).await;
            }

            let report = self.dispatch(id, DispatchTrigger::Sweep).await;
            summary.attempted += 1;
            match &report.outcome {
                DispatchOutcome::Acknowledged => summary.acknowledged += 1,
                DispatchOutcome::Failed(_) => summary.failed += 1,
                DispatchOutcome::Offline => summary.skipped += 1,
            }
            on_report(report);
        }

        if summary.attempted > 0 {
            info!(
                attempted = summary.attempted,
                acknowledged = summary.acknowledged,
                failed = summary.failed,
                skipped = summary.skipped,
                "sweep finished"
            );
        }
        summary
    }

    pub fn spawn_immediate(
        &self,
        id: ParticipantId,
        events: mpsc::UnboundedSender<DispatchEvent>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let report = dispatcher.dispatch(id, DispatchTrigger::Immediate).await;
            let _ = events.send(DispatchEvent::Report(report));
        })
    }

    /// Run a sweep on its own task. A [`DispatchEvent::SweepFinished`] is
    /// always the last event it sends.
    pub fn spawn_sweep(
        &self,
        ids: Vec<ParticipantId>,
        events: mpsc::UnboundedSender<DispatchEvent>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let summary = dispatcher
                .sweep(&ids, |report| {
                    let _ = events.send(DispatchEvent::Report(report));
                })
                .await;
            let _ = events.send(DispatchEvent::SweepFinished(summary));
        })
    }
}
