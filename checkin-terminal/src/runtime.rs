//! The terminal event loop.
//!
//! One task owns the [`CheckinEngine`] and multiplexes decoded input, the
//! sweep ticker, connectivity changes and dispatch reports. Network calls run
//! on spawned tasks and only report back; every state change happens here.

use std::{io::Write, sync::Arc, time::Duration};

use anyhow::Context;
use checkin_core::{
    CheckinEngine, CheckinError, CheckinStats, Connectivity, ConnectivityMonitor, DispatchEvent,
    DispatchTrigger, RosterAuthority, ScanCooldown, ScanDecision, StateStore, SyncDispatcher,
};
use checkin_model::ParticipantId;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, interval_at, timeout_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::TerminalConfig,
    input::{InputLine, InputLines, OperatorCommand},
    notice::{OperatorNotice, stats_line},
};

type Events = mpsc::UnboundedSender<DispatchEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// At most one sweep at a time; requests made meanwhile collapse into one
/// follow-up sweep.
#[derive(Debug, Default)]
struct SweepSlot {
    running: bool,
    requested: bool,
}

/// State left behind by a finished run.
#[derive(Debug)]
pub struct RunSummary<W> {
    pub stats: CheckinStats,
    pub pending: Vec<ParticipantId>,
    pub output: W,
}

#[derive(Debug)]
pub struct TerminalRuntime<W> {
    engine: CheckinEngine,
    authority: Arc<dyn RosterAuthority>,
    connectivity: Connectivity,
    dispatcher: SyncDispatcher,
    cooldown: ScanCooldown,
    probe_interval: Duration,
    drain_timeout: Duration,
    sweep: SweepSlot,
    immediate_in_flight: usize,
    out: W,
}

impl<W: Write> TerminalRuntime<W> {
    pub fn new(
        config: &TerminalConfig,
        store: StateStore,
        authority: Arc<dyn RosterAuthority>,
        out: W,
    ) -> Self {
        let connectivity = Connectivity::new(true);
        let dispatcher = SyncDispatcher::new(
            authority.clone(),
            connectivity.clone(),
            config.dispatch_policy(),
        );

        Self {
            engine: CheckinEngine::open(store),
            authority,
            connectivity,
            dispatcher,
            cooldown: ScanCooldown::new(config.cooldown),
            probe_interval: config.probe_interval,
            drain_timeout: config.request_timeout,
            sweep: SweepSlot::default(),
            immediate_in_flight: 0,
            out,
        }
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Run until input ends, `!quit` is entered or `shutdown` fires. Dispatch
    /// work still in flight is given one request timeout to report back.
    pub async fn run(
        mut self,
        mut lines: InputLines,
        shutdown: CancellationToken,
    ) -> anyhow::Result<RunSummary<W>> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let monitor = ConnectivityMonitor::new(
            self.authority.clone(),
            self.connectivity.clone(),
            self.probe_interval,
        );
        monitor.probe_once().await;
        let monitor_shutdown = shutdown.child_token();
        let monitor_task = monitor.spawn(monitor_shutdown.clone());

        let mut online_rx = self.connectivity.subscribe();
        online_rx.borrow_and_update();
        let mut stats_rx = self.engine.subscribe_stats();

        self.load_roster().await?;
        self.print_stats()?;
        self.request_sweep(&events_tx);

        let sweep_every = self.dispatcher.policy().sweep_interval;
        let mut ticker = interval_at(Instant::now() + sweep_every, sweep_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                _ = self.cooldown.elapsed(), if self.cooldown.is_cooling() => {
                    debug!("cooldown over, accepting input");
                }
                line = lines.next_line(), if !self.cooldown.is_cooling() => match line {
                    Ok(Some(line)) => {
                        if self.handle_line(&line, &events_tx).await? == Flow::Stop {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("input closed");
                        break;
                    }
                    Err(err) => {
                        error!(error = %err, "failed to read input");
                        break;
                    }
                },
                _ = ticker.tick() => self.request_sweep(&events_tx),
                changed = online_rx.changed() => {
                    if changed.is_ok() {
                        let online = *online_rx.borrow_and_update();
                        self.notify(&OperatorNotice::connectivity(online))?;
                        if online {
                            self.request_sweep(&events_tx);
                        }
                    }
                }
                Ok(()) = stats_rx.changed() => {
                    let stats = *stats_rx.borrow_and_update();
                    self.write_line(&stats_line(&stats))?;
                }
                Some(event) = events_rx.recv() => self.handle_event(event, &events_tx),
            }
        }

        monitor_shutdown.cancel();
        self.drain(&mut events_rx).await;
        if let Err(err) = monitor_task.await {
            warn!(error = %err, "connectivity monitor ended abnormally");
        }

        let stats = self.engine.stats();
        self.print_stats()?;
        Ok(RunSummary {
            stats,
            pending: self.engine.pending_ids(),
            output: self.out,
        })
    }

    async fn handle_line(&mut self, line: &str, events: &Events) -> anyhow::Result<Flow> {
        match InputLine::parse(line) {
            InputLine::NoCode => {}
            InputLine::Scan(raw) => self.handle_scan(&raw, events)?,
            InputLine::Command(command) => return self.handle_command(command, events).await,
            InputLine::UnknownCommand(command) => {
                self.notify(&OperatorNotice::unknown_command(&command))?;
            }
        }
        Ok(Flow::Continue)
    }

    fn handle_scan(&mut self, raw: &str, events: &Events) -> anyhow::Result<()> {
        let notice = match self.engine.process_scan(raw) {
            Ok(decision) => {
                let notice =
                    OperatorNotice::for_decision(&decision, self.connectivity.is_online());
                if let ScanDecision::Accepted(participant) = &decision {
                    self.immediate_in_flight += 1;
                    self.dispatcher.spawn_immediate(participant.id, events.clone());
                }
                notice
            }
            Err(CheckinError::NoRosterAvailable) => OperatorNotice::no_roster(),
            Err(err) => {
                error!(error = %err, "failed to record check-in");
                OperatorNotice::storage_failure()
            }
        };

        self.notify(&notice)?;
        self.cooldown.arm();
        Ok(())
    }

    async fn handle_command(
        &mut self,
        command: OperatorCommand,
        events: &Events,
    ) -> anyhow::Result<Flow> {
        debug!(?command, "operator command");
        match command {
            OperatorCommand::Refresh => {
                self.load_roster().await?;
                self.request_sweep(events);
            }
            OperatorCommand::Reset => {
                self.engine.reset().context("operator reset failed")?;
                self.notify(&OperatorNotice::reset_done())?;
                self.load_roster().await?;
            }
            OperatorCommand::Stats => self.print_stats()?,
            OperatorCommand::Online | OperatorCommand::Offline => {
                let online = command == OperatorCommand::Online;
                if !self.connectivity.set_online(online) {
                    self.notify(&OperatorNotice::connectivity(online))?;
                }
                if online {
                    self.request_sweep(events);
                }
            }
            OperatorCommand::Quit => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    fn handle_event(&mut self, event: DispatchEvent, events: &Events) {
        match event {
            DispatchEvent::Report(report) => {
                if report.trigger == DispatchTrigger::Immediate {
                    self.immediate_in_flight = self.immediate_in_flight.saturating_sub(1);
                }
                if let Err(err) = self.engine.apply_report(&report) {
                    error!(id = %report.id, error = %err, "failed to record sync result");
                }
            }
            DispatchEvent::SweepFinished(summary) => {
                debug!(?summary, "sweep task finished");
                self.sweep.running = false;
                if std::mem::take(&mut self.sweep.requested) {
                    self.request_sweep(events);
                }
            }
        }
    }

    fn request_sweep(&mut self, events: &Events) {
        if self.sweep.running {
            self.sweep.requested = true;
            return;
        }
        if !self.connectivity.is_online() {
            debug!("offline, sweep skipped");
            return;
        }
        let ids = self.engine.pending_ids();
        if ids.is_empty() {
            return;
        }

        debug!(pending = ids.len(), "starting sweep");
        self.sweep.running = true;
        self.dispatcher.spawn_sweep(ids, events.clone());
    }

    async fn load_roster(&mut self) -> anyhow::Result<()> {
        let notice = match self.engine.load_roster(self.authority.as_ref()).await {
            Ok(load) => OperatorNotice::roster_loaded(&load),
            Err(CheckinError::NoRosterAvailable) => {
                error!("no roster available; scanning is blocked until a refresh succeeds");
                OperatorNotice::no_roster()
            }
            Err(err) => return Err(err).context("roster load failed"),
        };
        self.notify(&notice)?;
        Ok(())
    }

    /// Apply reports from work already started. No new sweeps are started.
    async fn drain(&mut self, events_rx: &mut mpsc::UnboundedReceiver<DispatchEvent>) {
        self.sweep.requested = false;
        let deadline = Instant::now() + self.drain_timeout;

        while self.immediate_in_flight > 0 || self.sweep.running {
            match timeout_at(deadline, events_rx.recv()).await {
                Ok(Some(DispatchEvent::Report(report))) => {
                    if report.trigger == DispatchTrigger::Immediate {
                        self.immediate_in_flight = self.immediate_in_flight.saturating_sub(1);
                    }
                    if let Err(err) = self.engine.apply_report(&report) {
                        error!(id = %report.id, error = %err, "failed to record sync result");
                    }
                }
                Ok(Some(DispatchEvent::SweepFinished(_))) => self.sweep.running = false,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        immediate = self.immediate_in_flight,
                        sweep = self.sweep.running,
                        "stopped waiting for in-flight dispatches"
                    );
                    break;
                }
            }
        }
    }

    fn print_stats(&mut self) -> anyhow::Result<()> {
        let line = stats_line(&self.engine.stats());
        self.write_line(&line)
    }

    fn notify(&mut self, notice: &OperatorNotice) -> anyhow::Result<()> {
        self.write_line(&notice.to_string())
    }

    fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        writeln!(self.out, "{line}").context("failed to write to operator console")?;
        self.out.flush().context("failed to flush operator console")?;
        Ok(())
    }
}
