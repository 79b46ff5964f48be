use std::{
    io::Write,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use checkin_core::{
    StateStore,
    testing::{StubRosterAuthority, participant},
};
use checkin_model::{ParticipantId, ParticipantStatus};
use checkin_terminal::{
    CliOverrides, RunSummary, TerminalConfig, TerminalRuntime,
    config::{EnvConfig, FileConfig},
    input,
};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

fn config(dir: &TempDir) -> anyhow::Result<TerminalConfig> {
    config_with_cooldown(dir, Duration::ZERO)
}

fn config_with_cooldown(dir: &TempDir, cooldown: Duration) -> anyhow::Result<TerminalConfig> {
    let cli = CliOverrides {
        state_dir: Some(dir.path().join("state")),
        cooldown: Some(cooldown),
        dispatch_pacing: Some(Duration::from_millis(1)),
        request_timeout: Some(Duration::from_secs(2)),
        probe_interval: Some(Duration::from_secs(3600)),
        ..CliOverrides::default()
    };
    Ok(TerminalConfig::compose(
        &cli,
        &EnvConfig::default(),
        FileConfig::default(),
        None,
    )?)
}

fn authority() -> StubRosterAuthority {
    StubRosterAuthority::with_roster(vec![
        participant(1, ParticipantStatus::Approved),
        participant(2, ParticipantStatus::Pending),
    ])
}

async fn run_session(
    dir: &TempDir,
    authority: &StubRosterAuthority,
    script: &'static [u8],
) -> anyhow::Result<(RunSummary<Vec<u8>>, String)> {
    let config = config(dir)?;
    let store = StateStore::open(&config.state_dir)?;
    let runtime = TerminalRuntime::new(&config, store, Arc::new(authority.clone()), Vec::new());

    let summary = runtime
        .run(input::from_reader(script), CancellationToken::new())
        .await?;
    let output = String::from_utf8(summary.output.clone())?;
    Ok((summary, output))
}

#[tokio::test]
async fn session_shows_a_notice_per_decision_and_syncs() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let authority = authority();

    let (summary, output) = run_session(
        &dir,
        &authority,
        b"id : 1, status : approved\n\nid : 1\nid : 999\nid : 2\nnot a badge\n",
    )
    .await?;

    assert!(output.contains("Roster Loaded: 2 participants loaded."));
    assert!(output.contains("Welcome Participant 1!"));
    assert!(output.contains("Already Checked In"));
    assert!(output.contains("Participant Not Found: No participant found with ID: 999"));
    assert!(output.contains("Access Denied"));
    assert!(output.contains("Invalid QR Code"));
    assert_eq!(summary.stats.checked_in, 1);
    assert!(summary.pending.is_empty(), "immediate dispatch should be drained");
    assert!(authority.attended().contains(&ParticipantId(1)));
    Ok(())
}

#[tokio::test]
async fn offline_check_ins_sync_once_back_online() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let authority = authority();

    let (summary, output) = run_session(&dir, &authority, b"!offline\nid : 1\n!quit\n").await?;

    assert!(output.contains("Will sync when online."));
    assert_eq!(summary.pending, vec![ParticipantId(1)]);
    assert!(authority.attended().is_empty());

    let (summary, _) = run_session(&dir, &authority, b"!stats\n").await?;

    assert!(summary.pending.is_empty(), "startup sweep should deliver the backlog");
    assert_eq!(summary.stats.checked_in, 1);
    assert!(authority.attended().contains(&ParticipantId(1)));
    Ok(())
}

#[tokio::test]
async fn operator_can_force_a_reconnect_sweep() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let authority = authority();

    let (summary, _) = run_session(&dir, &authority, b"!offline\nid : 1\n!online\n").await?;

    assert!(summary.pending.is_empty());
    assert!(authority.attended().contains(&ParticipantId(1)));
    Ok(())
}

#[tokio::test]
async fn missing_roster_blocks_scanning() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let authority = authority();
    authority.fail_roster(checkin_core::RemoteError::Status(502));

    let (summary, output) = run_session(&dir, &authority, b"id : 1\n").await?;

    assert!(output.matches("Data Loading Failed").count() >= 2);
    assert_eq!(summary.stats.checked_in, 0);
    Ok(())
}

#[tokio::test]
async fn reset_command_wipes_local_state() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let authority = authority();
    authority.fail_mark_attended(checkin_core::RemoteError::Transport("down".into()));

    let (summary, output) = run_session(&dir, &authority, b"id : 1\n!reset\n").await?;

    assert!(output.contains("Storage Cleared"));
    assert_eq!(summary.stats.checked_in, 0);
    assert!(summary.pending.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_commands_are_reported() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let (_, output) = run_session(&dir, &authority(), b"!dance\n").await?;
    assert!(output.contains("Unknown Command"));
    Ok(())
}

#[tokio::test]
async fn undecodable_frame_is_rejected_and_session_continues() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let authority = authority();

    let (summary, output) =
        run_session(&dir, &authority, b"\xff\xfe garbage frame\nid : 1\n").await?;

    assert!(output.contains("Invalid QR Code"));
    assert!(output.contains("Welcome Participant 1!"));
    assert_eq!(summary.stats.checked_in, 1);
    Ok(())
}

/// Console the test can read while the session is still running.
#[derive(Debug, Clone, Default)]
struct SharedConsole(Arc<Mutex<Vec<u8>>>);

impl SharedConsole {
    fn text(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedConsole {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn cooldown_defers_the_next_scan_until_it_ends() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let authority = StubRosterAuthority::with_roster(vec![
        participant(1, ParticipantStatus::Approved),
        participant(2, ParticipantStatus::Approved),
    ]);
    let config = config_with_cooldown(&dir, Duration::from_secs(3))?;
    let store = StateStore::open(&config.state_dir)?;
    let console = SharedConsole::default();
    let runtime = TerminalRuntime::new(&config, store, Arc::new(authority.clone()), console.clone());

    let (mut feed, decoder_output) = tokio::io::duplex(256);
    let session = runtime.run(input::from_reader(decoder_output), CancellationToken::new());

    let operator = async {
        feed.write_all(b"id : 1\nid : 2\n").await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let early = console.text();
        assert!(early.contains("Welcome Participant 1!"));
        assert!(!early.contains("Welcome Participant 2!"), "second scan read during cooldown");

        tokio::time::sleep(Duration::from_millis(2_800)).await;
        assert!(!console.text().contains("Welcome Participant 2!"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(console.text().contains("Welcome Participant 2!"), "deferred scan was dropped");

        drop(feed);
        anyhow::Ok(())
    };

    let (summary, operator) = tokio::join!(session, operator);
    operator?;
    let summary = summary?;

    assert_eq!(summary.stats.checked_in, 2);
    assert!(authority.attended().contains(&ParticipantId(2)));
    Ok(())
}
