use std::{sync::Arc, time::Duration};

use checkin_core::{
    CheckedInVia, CheckinEngine, CheckinStats, Connectivity, DispatchOutcome, DispatchPolicy,
    PayloadError, RemoteError, ScanDecision, ScanRejection, StateStore, SyncDispatcher,
    testing::{StubRosterAuthority, participant},
};
use checkin_model::{ParticipantId, ParticipantStatus};
use tempfile::TempDir;

struct Terminal {
    _dir: TempDir,
    engine: CheckinEngine,
    authority: StubRosterAuthority,
    connectivity: Connectivity,
    dispatcher: SyncDispatcher,
}

async fn terminal(online: bool) -> anyhow::Result<Terminal> {
    let dir = TempDir::new()?;
    let store = StateStore::open(dir.path().join("state"))?;
    let authority = StubRosterAuthority::with_roster(vec![
        participant(1, ParticipantStatus::Approved),
        participant(2, ParticipantStatus::Pending),
        participant(3, ParticipantStatus::Approved),
        participant(4, ParticipantStatus::Attended),
    ]);
    let connectivity = Connectivity::new(online);
    let dispatcher = SyncDispatcher::new(
        Arc::new(authority.clone()),
        connectivity.clone(),
        DispatchPolicy {
            pacing: Duration::from_millis(1),
            ..DispatchPolicy::default()
        },
    );

    let mut engine = CheckinEngine::open(store);
    engine.load_roster(&authority).await?;

    Ok(Terminal {
        _dir: dir,
        engine,
        authority,
        connectivity,
        dispatcher,
    })
}

fn status_of(engine: &CheckinEngine, id: u64) -> ParticipantStatus {
    engine
        .roster()
        .lookup(ParticipantId(id))
        .map(|p| p.status)
        .expect("participant in roster")
}

fn scanned(engine: &CheckinEngine) -> Vec<ParticipantId> {
    engine.ledger().ids().collect()
}

#[tokio::test]
async fn approved_participant_is_accepted_and_queued() -> anyhow::Result<()> {
    let Terminal { _dir, mut engine, .. } = terminal(true).await?;

    let decision = engine.process_scan("id : 1, status : approved")?;

    let ScanDecision::Accepted(participant) = decision else {
        panic!("expected acceptance, got {decision:?}");
    };
    assert_eq!(participant.id, ParticipantId(1));
    assert_eq!(participant.status, ParticipantStatus::Attended);
    assert_eq!(status_of(&engine, 1), ParticipantStatus::Attended);
    assert_eq!(scanned(&engine), vec![ParticipantId(1)]);
    assert_eq!(engine.pending_ids(), vec![ParticipantId(1)]);
    assert_eq!(
        engine.stats(),
        CheckinStats {
            checked_in: 1,
            pending: 1
        }
    );
    assert!(engine.check_invariants().is_empty());
    Ok(())
}

#[tokio::test]
async fn second_scan_is_already_checked_in_and_changes_nothing() -> anyhow::Result<()> {
    let Terminal { _dir, mut engine, .. } = terminal(true).await?;
    engine.process_scan("id : 1, status : approved")?;
    let records_before = engine.ledger().records().to_vec();

    let decision = engine.process_scan("id : 1, status : approved")?;

    assert!(matches!(
        decision,
        ScanDecision::Rejected(ScanRejection::AlreadyCheckedIn {
            via: CheckedInVia::ThisTerminal,
            ..
        })
    ));
    assert_eq!(engine.ledger().records(), records_before.as_slice());
    assert_eq!(engine.pending_ids(), vec![ParticipantId(1)]);
    assert_eq!(status_of(&engine, 1), ParticipantStatus::Attended);
    Ok(())
}

#[tokio::test]
async fn unknown_participant_is_not_found() -> anyhow::Result<()> {
    let Terminal { _dir, mut engine, .. } = terminal(true).await?;

    let decision = engine.process_scan("id : 999")?;

    assert_eq!(
        decision,
        ScanDecision::Rejected(ScanRejection::ParticipantNotFound(ParticipantId(999)))
    );
    assert!(scanned(&engine).is_empty());
    assert!(engine.pending_ids().is_empty());
    Ok(())
}

#[tokio::test]
async fn pending_participant_without_token_is_denied() -> anyhow::Result<()> {
    let Terminal { _dir, mut engine, .. } = terminal(true).await?;

    let decision = engine.process_scan("id : 2")?;

    assert!(matches!(
        decision,
        ScanDecision::Rejected(ScanRejection::NotApproved(ref p)) if p.id == ParticipantId(2)
    ));
    assert_eq!(status_of(&engine, 2), ParticipantStatus::Pending);
    assert!(scanned(&engine).is_empty());
    assert!(engine.pending_ids().is_empty());
    Ok(())
}

#[tokio::test]
async fn badge_token_overrides_pending_status() -> anyhow::Result<()> {
    let Terminal { _dir, mut engine, .. } = terminal(true).await?;

    let decision = engine.process_scan("id : 2, status : approved")?;

    assert!(decision.is_accepted());
    assert_eq!(status_of(&engine, 2), ParticipantStatus::Attended);
    Ok(())
}

#[tokio::test]
async fn token_match_is_case_sensitive() -> anyhow::Result<()> {
    let Terminal { _dir, mut engine, .. } = terminal(true).await?;

    let decision = engine.process_scan("id : 2, status : Approved")?;

    assert!(matches!(
        decision,
        ScanDecision::Rejected(ScanRejection::NotApproved(_))
    ));
    Ok(())
}

#[tokio::test]
async fn roster_attended_is_reported_as_already_scanned_elsewhere() -> anyhow::Result<()> {
    let Terminal { _dir, mut engine, .. } = terminal(true).await?;

    let decision = engine.process_scan("id : 4, status : approved")?;

    assert!(matches!(
        decision,
        ScanDecision::Rejected(ScanRejection::AlreadyCheckedIn {
            via: CheckedInVia::Roster,
            ..
        })
    ));
    assert!(engine.pending_ids().is_empty());
    Ok(())
}

#[tokio::test]
async fn offline_acceptance_is_delivered_after_reconnect() -> anyhow::Result<()> {
    let Terminal {
        _dir,
        mut engine,
        authority,
        connectivity,
        dispatcher,
        ..
    } = terminal(false).await?;

    assert!(engine.process_scan("id : 3, status : approved")?.is_accepted());

    let report = engine.dispatch_now(&dispatcher, ParticipantId(3)).await?;
    assert_eq!(report.outcome, DispatchOutcome::Offline);
    assert!(authority.mark_attended_calls().is_empty());
    assert_eq!(engine.pending_ids(), vec![ParticipantId(3)]);

    assert!(connectivity.set_online(true));
    let summary = engine.sweep(&dispatcher).await?;

    assert_eq!(summary.acknowledged, 1);
    assert!(engine.pending_ids().is_empty());
    assert!(authority.attended().contains(&ParticipantId(3)));
    assert_eq!(
        engine.stats(),
        CheckinStats {
            checked_in: 1,
            pending: 0
        }
    );
    Ok(())
}

#[tokio::test]
async fn malformed_payloads_never_mutate_state() -> anyhow::Result<()> {
    let Terminal { _dir, mut engine, .. } = terminal(true).await?;
    engine.process_scan("id : 1")?;
    let records = engine.ledger().records().to_vec();
    let pending = engine.pending_ids();

    for raw in [
        "",
        "status : approved",
        "identifier",
        "ID : 3",
        "id : abc, status : approved",
        "https://example.com/ticket/3",
    ] {
        let decision = engine.process_scan(raw)?;
        assert_eq!(
            decision,
            ScanDecision::Rejected(ScanRejection::InvalidFormat(PayloadError::MissingId)),
            "input {raw:?}"
        );
        assert_eq!(engine.ledger().records(), records.as_slice());
        assert_eq!(engine.pending_ids(), pending);
    }
    Ok(())
}

#[tokio::test]
async fn failed_deliveries_stay_queued_until_the_authority_recovers() -> anyhow::Result<()> {
    let Terminal {
        _dir,
        mut engine,
        authority,
        dispatcher,
        ..
    } = terminal(true).await?;
    authority.fail_next_mark_attended(3, RemoteError::Status(503));

    engine.process_scan("id : 1")?;
    engine.process_scan("id : 3")?;

    let report = engine.dispatch_now(&dispatcher, ParticipantId(1)).await?;
    assert_eq!(report.outcome, DispatchOutcome::Failed(RemoteError::Status(503)));
    assert_eq!(engine.pending_ids(), vec![ParticipantId(1), ParticipantId(3)]);

    let mut sweeps = 0;
    while !engine.pending_ids().is_empty() {
        sweeps += 1;
        assert!(sweeps <= 5, "queue never drained");
        engine.sweep(&dispatcher).await?;
        assert!(engine.check_invariants().is_empty());
    }

    assert_eq!(
        authority.attended().into_iter().collect::<Vec<_>>(),
        vec![ParticipantId(1), ParticipantId(3)]
    );
    Ok(())
}

#[tokio::test]
async fn repeated_acknowledgements_are_harmless() -> anyhow::Result<()> {
    let Terminal {
        _dir,
        mut engine,
        authority,
        dispatcher,
        ..
    } = terminal(true).await?;
    engine.process_scan("id : 1")?;

    engine.dispatch_now(&dispatcher, ParticipantId(1)).await?;
    let again = engine.dispatch_now(&dispatcher, ParticipantId(1)).await?;

    assert!(again.is_acknowledged());
    assert!(engine.pending_ids().is_empty());
    assert_eq!(
        authority.mark_attended_calls(),
        vec![ParticipantId(1), ParticipantId(1)]
    );
    Ok(())
}

#[tokio::test]
async fn subset_invariant_holds_across_a_mixed_session() -> anyhow::Result<()> {
    let Terminal {
        _dir,
        mut engine,
        authority,
        connectivity,
        dispatcher,
        ..
    } = terminal(true).await?;
    authority.fail_mark_attended(RemoteError::Transport("connection reset".into()));

    let inputs = [
        "id : 1",
        "garbage",
        "id : 2",
        "id : 2, status : approved",
        "id : 1",
        "id : 999",
        "id : 3",
        "id : 4",
    ];
    for raw in inputs {
        if let ScanDecision::Accepted(participant) = engine.process_scan(raw)? {
            engine.dispatch_now(&dispatcher, participant.id).await?;
        }
        assert!(engine.check_invariants().is_empty(), "after {raw:?}");
        let pending = engine.pending_ids();
        assert!(pending.iter().all(|id| engine.ledger().contains(*id)));
    }

    connectivity.set_online(false);
    engine.sweep(&dispatcher).await?;
    assert_eq!(engine.pending_ids().len(), 3);

    connectivity.set_online(true);
    authority.recover();
    engine.sweep(&dispatcher).await?;
    assert!(engine.pending_ids().is_empty());
    assert_eq!(engine.stats().checked_in, 3);
    Ok(())
}

#[tokio::test]
async fn stats_subscribers_see_every_change() -> anyhow::Result<()> {
    let Terminal {
        _dir,
        mut engine,
        dispatcher,
        ..
    } = terminal(true).await?;
    let mut stats = engine.subscribe_stats();

    engine.process_scan("id : 1")?;
    assert!(stats.has_changed()?);
    assert_eq!(stats.borrow_and_update().pending, 1);

    engine.sweep(&dispatcher).await?;
    assert!(stats.has_changed()?);
    assert_eq!(
        *stats.borrow_and_update(),
        CheckinStats {
            checked_in: 1,
            pending: 0
        }
    );
    Ok(())
}
