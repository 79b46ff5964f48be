//! Display counters derived from the ledger and the pending queue.

use tokio::sync::watch;

use crate::{ledger::ScanLedger, queue::PendingSyncQueue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckinStats {
    /// Participants accepted at this terminal.
    pub checked_in: usize,
    /// Of those, how many the authority has not acknowledged yet.
    pub pending: usize,
}

impl CheckinStats {
    pub fn derive(ledger: &ScanLedger, queue: &PendingSyncQueue) -> Self {
        Self {
            checked_in: ledger.len(),
            pending: queue.size(),
        }
    }
}

/// Publishes [`CheckinStats`] to anyone watching. Holds no state of its own
/// beyond the last published value.
#[derive(Debug)]
pub struct StatsAggregator {
    tx: watch::Sender<CheckinStats>,
}

impl StatsAggregator {
    pub fn new(initial: CheckinStats) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn refresh(&self, ledger: &ScanLedger, queue: &PendingSyncQueue) -> CheckinStats {
        let stats = CheckinStats::derive(ledger, queue);
        self.tx.send_replace(stats);
        stats
    }

    pub fn current(&self) -> CheckinStats {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CheckinStats> {
        self.tx.subscribe()
    }
}
