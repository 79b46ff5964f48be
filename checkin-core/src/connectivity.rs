//! Online/offline state of the terminal.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::remote::RosterAuthority;

/// Shared connectivity flag with change notification.
///
/// Clones observe and update the same flag. Subscribers are woken on every
/// actual change, so an offline→online edge can kick off a sweep.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the current state. Returns `true` if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Periodically probes the authority and feeds the result into a
/// [`Connectivity`] flag.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    authority: Arc<dyn RosterAuthority>,
    connectivity: Connectivity,
    interval: Duration,
}

impl ConnectivityMonitor {
    pub fn new(
        authority: Arc<dyn RosterAuthority>,
        connectivity: Connectivity,
        interval: Duration,
    ) -> Self {
        Self {
            authority,
            connectivity,
            interval,
        }
    }

    /// Probe once and update the flag. Returns the probed state.
    pub async fn probe_once(&self) -> bool {
        let online = self.authority.probe().await;
        debug!(online, "connectivity probe");
        self.connectivity.set_online(online);
        online
    }

    /// Probe every `interval` until `shutdown` fires. The first probe runs
    /// one interval from now; call [`Self::probe_once`] for an initial state.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("connectivity monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.probe_once().await;
                    }
                }
            }
        })
    }
}
