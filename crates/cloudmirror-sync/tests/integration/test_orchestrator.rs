//! Integration tests for the orchestrator loops and operator commands
//!
//! All tests run on a paused clock: the queue processor ticks every second
//! and the periodic trigger every 30 seconds of virtual time, and scripted
//! rclone calls "take" virtual time through `Scripted::after`.

use std::time::Duration;

use cloudmirror_core::domain::SyncStatus;
use cloudmirror_sync::{OrchestratorError, OrchestratorSettings};

use crate::common::{advance, Fixture, Scripted, ScriptedRunner, POLL, TICK};

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

// ============================================================================
// Startup checks
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_fails_when_remote_not_configured() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    runner.script("listremotes", "", Scripted::lines(&["dropbox:"]));
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);

    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::RemoteNotConfigured(ref r) if r == "gdrive"));
    assert!(!orchestrator.is_running());
    assert!(runner.calls_for("bisync", fixture.dir_str("Documents")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_verify_remote_reports_unreachable() {
    let fixture = Fixture::new(&[]);
    let runner = ScriptedRunner::new();
    runner.script(
        "lsd",
        "gdrive:",
        Scripted::fail(1, &["ERROR : couldn't connect: dial tcp: no route to host"]),
    );
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &[]);

    let err = orchestrator.verify_remote().await.unwrap_err();
    match err {
        OrchestratorError::RemoteUnreachable { remote, detail } => {
            assert_eq!(remote, "gdrive");
            assert!(detail.contains("no route to host"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_and_stop_when_stopped() {
    let fixture = Fixture::new(&[]);
    let runner = ScriptedRunner::new();
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &[]);

    orchestrator.start().await.unwrap();
    assert!(matches!(
        orchestrator.start().await,
        Err(OrchestratorError::AlreadyRunning)
    ));
    orchestrator.stop().await.unwrap();
    assert!(matches!(
        orchestrator.stop().await,
        Err(OrchestratorError::NotRunning)
    ));

    // Verification is not repeated on restart.
    orchestrator.start().await.unwrap();
    assert_eq!(runner.calls_for("lsd", "gdrive:").len(), 1);
    orchestrator.stop().await.unwrap();
}

// ============================================================================
// Queue processing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_and_quick_directory_scenario() {
    let fixture = Fixture::new(&["D1", "D2"]);
    let runner = ScriptedRunner::new();
    runner.script("bisync", fixture.dir_str("D1"), Scripted::ok().after(5 * TICK));
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["D1", "D2"]);
    let d1 = fixture.dir("D1");
    let d2 = fixture.dir("D2");

    orchestrator.start().await.unwrap();

    advance(secs(2.5)).await;
    let d2_state = orchestrator.registry().state_of(&d2).unwrap();
    assert_eq!(d2_state.status, SyncStatus::Idle);
    assert!(d2_state.last_sync.is_some());
    assert_eq!(orchestrator.registry().status_of(&d1), Some(SyncStatus::Syncing));

    // Re-enqueueing the busy directory never duplicates it.
    orchestrator.sync_one(&d1).unwrap();
    orchestrator.sync_one(&d1).unwrap();
    assert_eq!(orchestrator.status().queue_size, 1);

    advance(secs(2.0)).await;
    assert_eq!(orchestrator.registry().status_of(&d1), Some(SyncStatus::Syncing));
    assert_eq!(orchestrator.status().queue_size, 1);

    advance(secs(2.0)).await;
    assert_eq!(orchestrator.registry().status_of(&d1), Some(SyncStatus::Idle));
    assert_eq!(runner.calls_for("bisync", fixture.dir_str("D1")).len(), 2);
    assert_eq!(runner.peak("bisync", fixture.dir_str("D1")), 1);
    assert_eq!(orchestrator.status().queue_size, 0);

    orchestrator.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exclusivity_under_enqueue_flood() {
    let fixture = Fixture::new(&["D1", "D2"]);
    let runner = ScriptedRunner::new();
    for _ in 0..10 {
        runner.script("bisync", fixture.dir_str("D1"), Scripted::ok().after(secs(2.5)));
    }
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["D1", "D2"]);
    let d1 = fixture.dir("D1");

    orchestrator.start().await.unwrap();

    for _ in 0..40 {
        orchestrator.sync_one(&d1).unwrap();
        orchestrator.sync_all().unwrap();
        assert!(orchestrator.status().queue_size <= 2);
        advance(secs(0.25)).await;
    }

    orchestrator.stop().await.unwrap();

    assert_eq!(runner.peak("bisync", fixture.dir_str("D1")), 1);
    assert_eq!(runner.peak("bisync", fixture.dir_str("D2")), 1);
    assert!(runner.calls_for("bisync", fixture.dir_str("D1")).len() >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_block_other_directory() {
    let fixture = Fixture::new(&["A", "B"]);
    let runner = ScriptedRunner::new();
    runner.script(
        "bisync",
        fixture.dir_str("A"),
        Scripted::fail(1, &["ERROR : quota exceeded"]),
    );
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["A", "B"]);

    orchestrator.start().await.unwrap();
    advance(secs(1.5)).await;

    let status = orchestrator.status();
    let a = status
        .directories
        .iter()
        .find(|d| d.local_path == fixture.dir("A"))
        .unwrap();
    let b = status
        .directories
        .iter()
        .find(|d| d.local_path == fixture.dir("B"))
        .unwrap();
    assert_eq!(a.status, SyncStatus::Error);
    assert_eq!(a.last_error.as_deref(), Some("ERROR : quota exceeded"));
    assert_eq!(b.status, SyncStatus::Idle);
    assert!(b.last_sync.is_some());

    orchestrator.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resync_flag_only_until_first_success() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);

    orchestrator.start().await.unwrap();
    advance(secs(0.5)).await;
    advance(POLL + TICK).await;
    orchestrator.stop().await.unwrap();

    let calls = runner.calls_for("bisync", fixture.dir_str("Documents"));
    assert_eq!(calls.len(), 2);
    assert!(calls[0].has("--resync"));
    assert!(!calls[1].has("--resync"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_directory_retried_by_periodic_trigger() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    runner.script(
        "bisync",
        fixture.dir_str("Documents"),
        Scripted::fail(1, &["ERROR : network down"]),
    );
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);
    let path = fixture.dir("Documents");

    orchestrator.start().await.unwrap();
    advance(secs(0.5)).await;
    assert_eq!(orchestrator.registry().status_of(&path), Some(SyncStatus::Error));

    advance(POLL + TICK).await;
    let state = orchestrator.registry().state_of(&path).unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.consecutive_failures, 0);

    let calls = runner.calls_for("bisync", fixture.dir_str("Documents"));
    assert_eq!(calls.len(), 2);
    assert!(calls[1].has("--resync"), "resync stays pending after a failure");

    orchestrator.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_limits_parallel_runs() {
    let fixture = Fixture::new(&["D1", "D2"]);
    let runner = ScriptedRunner::new();
    runner.script("bisync", fixture.dir_str("D1"), Scripted::ok().after(3 * TICK));
    runner.script("bisync", fixture.dir_str("D2"), Scripted::ok().after(3 * TICK));
    let settings = OrchestratorSettings {
        max_concurrent: Some(1),
        ..fixture.settings()
    };
    let orchestrator = fixture.orchestrator(runner.clone(), settings, &["D1", "D2"]);

    orchestrator.start().await.unwrap();
    advance(secs(1.5)).await;

    let syncing = orchestrator
        .status()
        .directories
        .iter()
        .filter(|d| d.status == SyncStatus::Syncing)
        .count();
    assert_eq!(syncing, 1);
    assert_eq!(orchestrator.status().queue_size, 1);

    advance(secs(6.0)).await;
    assert_eq!(runner.calls_for("bisync", fixture.dir_str("D2")).len(), 1);
    assert_eq!(orchestrator.status().queue_size, 0);

    orchestrator.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_run_releases_gate() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    runner.script("bisync", fixture.dir_str("Documents"), Scripted::panic());
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);
    let path = fixture.dir("Documents");

    orchestrator.start().await.unwrap();
    advance(secs(0.5)).await;

    let state = orchestrator.registry().state_of(&path).unwrap();
    assert_eq!(state.status, SyncStatus::Error);
    assert!(state.last_error.unwrap().contains("ended abnormally"));

    orchestrator.sync_one(&path).unwrap();
    advance(secs(1.0)).await;
    assert_eq!(orchestrator.registry().status_of(&path), Some(SyncStatus::Idle));

    orchestrator.stop().await.unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_sync() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    runner.script("bisync", fixture.dir_str("Documents"), Scripted::ok().after(5 * TICK));
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);
    let path = fixture.dir("Documents");

    orchestrator.start().await.unwrap();
    advance(secs(0.5)).await;
    assert_eq!(orchestrator.registry().status_of(&path), Some(SyncStatus::Syncing));

    let started = tokio::time::Instant::now();
    orchestrator.stop().await.unwrap();
    assert!(started.elapsed() >= secs(4.0));
    assert_eq!(orchestrator.registry().status_of(&path), Some(SyncStatus::Idle));

    assert!(matches!(
        orchestrator.sync_one(&path),
        Err(OrchestratorError::NotRunning)
    ));
    assert!(matches!(
        orchestrator.sync_all(),
        Err(OrchestratorError::NotRunning)
    ));
    assert_eq!(orchestrator.status().queue_size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_register_while_running_syncs_promptly() {
    let fixture = Fixture::new(&["Documents", "Late"]);
    let runner = ScriptedRunner::new();
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);

    orchestrator.start().await.unwrap();
    advance(secs(0.5)).await;

    orchestrator
        .register(&fixture.dir("Late"), "gdrive:Late")
        .unwrap();
    advance(secs(1.0)).await;

    assert_eq!(runner.calls_for("bisync", fixture.dir_str("Late")).len(), 1);
    orchestrator.stop().await.unwrap();
}

// ============================================================================
// Operator commands
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_operator_errors_do_not_mutate() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);

    let missing = fixture.tmp.path().join("missing");
    assert!(matches!(
        orchestrator.register(&missing, "gdrive:missing"),
        Err(OrchestratorError::Domain(_))
    ));
    assert_eq!(orchestrator.registry().len(), 1);

    orchestrator.start().await.unwrap();
    assert!(matches!(
        orchestrator.sync_one(&missing),
        Err(OrchestratorError::UnknownDirectory(_))
    ));
    assert!(matches!(
        orchestrator.force_resync(&missing),
        Err(OrchestratorError::UnknownDirectory(_))
    ));

    let before = orchestrator.excludes();
    assert!(matches!(
        orchestrator.remove_exclude("*.nope"),
        Err(OrchestratorError::Domain(_))
    ));
    assert!(matches!(
        orchestrator.add_exclude("[broken"),
        Err(OrchestratorError::Domain(_))
    ));
    assert_eq!(orchestrator.excludes(), before);

    orchestrator.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_force_resync_rejects_busy_directory() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    runner.script("bisync", fixture.dir_str("Documents"), Scripted::ok().after(3 * TICK));
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);
    let path = fixture.dir("Documents");

    orchestrator.start().await.unwrap();
    advance(secs(0.5)).await;

    assert!(matches!(
        orchestrator.force_resync(&path),
        Err(OrchestratorError::DirectoryBusy(_))
    ));

    advance(secs(3.0)).await;
    let report = orchestrator.force_resync(&path).unwrap().await.unwrap();
    assert!(report.outcome.is_success());
    assert!(report.deletions_pushed);
    assert_eq!(runner.calls_for("sync", fixture.dir_str("Documents")).len(), 1);

    orchestrator.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_added_exclude_reaches_next_invocation() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    let orchestrator = fixture.orchestrator(runner.clone(), fixture.settings(), &["Documents"]);

    orchestrator.add_exclude("*.iso").unwrap();
    assert_eq!(orchestrator.excludes(), ["*.iso"]);

    orchestrator.start().await.unwrap();
    advance(secs(0.5)).await;

    let calls = runner.calls_for("bisync", fixture.dir_str("Documents"));
    let args = &calls[0].args;
    let at = args.iter().position(|a| a == "--exclude").unwrap();
    assert_eq!(args[at + 1], "*.iso");

    orchestrator.remove_exclude("*.iso").unwrap();
    assert!(orchestrator.excludes().is_empty());

    orchestrator.stop().await.unwrap();
}
