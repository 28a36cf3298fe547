//! Integration tests for the sync executor
//!
//! Drives [`SyncExecutor`] directly against a scripted rclone and checks
//! the recovery sequence, the resulting registry state and, for the forced
//! resync path, the ordering of destructive steps.

use std::path::PathBuf;

use chrono::Utc;

use cloudmirror_core::domain::SyncStatus;
use cloudmirror_sync::{janitor::BisyncJanitor, Recovery, SyncOutcome};

use crate::common::{Fixture, Scripted, ScriptedRunner};

const LOCK_ERROR: &str =
    "2024/05/01 10:00:00 ERROR : Bisync critical error: prior lock file found: /wd/x.lck";
const STATE_ERROR: &str =
    "2024/05/01 10:00:00 ERROR : Bisync critical error: cannot find prior Path1 or Path2 listings";
const REMOTE_ERROR: &str =
    "2024/05/01 10:00:00 ERROR : error reading destination root directory: directory not found";

fn lock_file(fixture: &Fixture, name: &str) -> PathBuf {
    let session = BisyncJanitor::session_name(&fixture.dir(name), &Fixture::remote(name));
    fixture.work_dir.join(format!("{session}.lck"))
}

#[tokio::test]
async fn test_first_run_uses_resync_and_clears_lock_first() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    runner.observe(&fixture.work_dir);
    let (executor, registry) = fixture.executor(runner.clone(), &["Documents"]);

    std::fs::write(lock_file(&fixture, "Documents"), b"1234").unwrap();

    let dir = registry.try_begin_sync(&fixture.dir("Documents")).unwrap();
    let report = executor.run(dir).await;

    assert_eq!(report.outcome, SyncOutcome::Success);
    assert_eq!(report.attempts, 1);
    assert!(report.used_resync);
    assert!(report.recoveries.is_empty());

    let calls = runner.calls_for("bisync", fixture.dir_str("Documents"));
    assert_eq!(calls.len(), 1);
    assert!(calls[0].has("--resync"));
    assert_eq!(calls[0].observed_files, 0, "lock must be gone before the run");

    let state = registry.state_of(&fixture.dir("Documents")).unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(!state.needs_initial_sync);
    assert!(state.last_sync.is_some());
}

#[tokio::test]
async fn test_stale_lock_cleared_once_then_success() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    runner.observe(&fixture.work_dir);
    let (executor, registry) = fixture.executor(runner.clone(), &["Documents"]);
    let path = fixture.dir("Documents");

    // Complete the initial sync so no proactive clear happens.
    let dir = registry.try_begin_sync(&path).unwrap();
    executor.run(dir).await;

    std::fs::write(lock_file(&fixture, "Documents"), b"1234").unwrap();
    runner.script("bisync", fixture.dir_str("Documents"), Scripted::fail(2, &[LOCK_ERROR]));
    runner.script("bisync", fixture.dir_str("Documents"), Scripted::ok());

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.run(dir).await;

    assert_eq!(report.outcome, SyncOutcome::Success);
    assert_eq!(report.recoveries, [Recovery::LockCleared]);
    assert_eq!(report.attempts, 2);
    assert!(!report.used_resync);
    assert!(!lock_file(&fixture, "Documents").exists());

    let calls = runner.calls_for("bisync", fixture.dir_str("Documents"));
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].observed_files, 1);
    assert_eq!(calls[2].observed_files, 0);
    assert_eq!(calls[1].args, calls[2].args, "retry repeats the same invocation");

    let state = registry.state_of(&path).unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn test_repeated_lock_failure_is_not_retried_twice() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    let (executor, registry) = fixture.executor(runner.clone(), &["Documents"]);
    let path = fixture.dir("Documents");

    runner.script("bisync", fixture.dir_str("Documents"), Scripted::fail(2, &[LOCK_ERROR]));
    runner.script("bisync", fixture.dir_str("Documents"), Scripted::fail(2, &[LOCK_ERROR]));

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.run(dir).await;

    assert!(!report.outcome.is_success());
    assert_eq!(report.attempts, 2);
    assert_eq!(report.recoveries, [Recovery::LockCleared]);

    let state = registry.state_of(&path).unwrap();
    assert_eq!(state.status, SyncStatus::Error);
    assert!(state.last_error.unwrap().contains("prior lock file found"));
    assert!(state.needs_initial_sync, "failure keeps the resync flag");
}

#[tokio::test]
async fn test_missing_remote_is_created_and_resynced() {
    let fixture = Fixture::new(&["Music"]);
    let runner = ScriptedRunner::new();
    let (executor, registry) = fixture.executor(runner.clone(), &["Music"]);
    let path = fixture.dir("Music");

    let dir = registry.try_begin_sync(&path).unwrap();
    executor.run(dir).await;

    runner.script("bisync", fixture.dir_str("Music"), Scripted::fail(7, &[REMOTE_ERROR]));

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.run(dir).await;

    assert_eq!(report.outcome, SyncOutcome::Success);
    assert_eq!(report.recoveries, [Recovery::RemoteCreated]);
    assert!(report.used_resync);

    let mkdir = runner.calls_for("mkdir", "gdrive:Music");
    assert_eq!(mkdir.len(), 1);

    let calls = runner.calls_for("bisync", fixture.dir_str("Music"));
    assert_eq!(calls.len(), 3);
    assert!(!calls[1].has("--resync"));
    assert!(calls[2].has("--resync"));
}

#[tokio::test]
async fn test_missing_state_forces_resync() {
    let fixture = Fixture::new(&["Pictures"]);
    let runner = ScriptedRunner::new();
    let (executor, registry) = fixture.executor(runner.clone(), &["Pictures"]);
    let path = fixture.dir("Pictures");

    let dir = registry.try_begin_sync(&path).unwrap();
    executor.run(dir).await;

    runner.script("bisync", fixture.dir_str("Pictures"), Scripted::fail(2, &[STATE_ERROR]));

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.run(dir).await;

    assert_eq!(report.outcome, SyncOutcome::Success);
    assert_eq!(report.recoveries, [Recovery::StateRebuilt]);
    let calls = runner.calls_for("bisync", fixture.dir_str("Pictures"));
    assert!(calls.last().unwrap().has("--resync"));
    assert!(runner.calls_for("mkdir", "gdrive:Pictures").is_empty());
}

#[tokio::test]
async fn test_recoveries_chain_forward_only() {
    let fixture = Fixture::new(&["Videos"]);
    let runner = ScriptedRunner::new();
    let (executor, registry) = fixture.executor(runner.clone(), &["Videos"]);
    let path = fixture.dir("Videos");
    let target = fixture.dir_str("Videos");

    runner.script("bisync", &target, Scripted::fail(2, &[LOCK_ERROR]));
    runner.script("bisync", &target, Scripted::fail(2, &[STATE_ERROR]));
    runner.script("bisync", &target, Scripted::fail(2, &[LOCK_ERROR]));

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.run(dir).await;

    assert_eq!(report.recoveries, [Recovery::LockCleared, Recovery::StateRebuilt]);
    assert_eq!(report.attempts, 3);
    assert!(!report.outcome.is_success());
    assert_eq!(registry.status_of(&path), Some(SyncStatus::Error));
}

#[tokio::test]
async fn test_unclassified_failure_records_error_tail() {
    let fixture = Fixture::new(&["Desktop"]);
    let runner = ScriptedRunner::new();
    let (executor, registry) = fixture.executor(runner.clone(), &["Desktop"]);
    let path = fixture.dir("Desktop");

    runner.script(
        "bisync",
        fixture.dir_str("Desktop"),
        Scripted::fail(
            1,
            &[
                "NOTICE: starting",
                "ERROR : a.txt: quota exceeded",
                "ERROR : Bisync aborted",
                "NOTICE: done",
            ],
        ),
    );

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.run(dir).await;

    assert_eq!(report.attempts, 1);
    assert!(report.recoveries.is_empty());
    let state = registry.state_of(&path).unwrap();
    assert_eq!(state.status, SyncStatus::Error);
    assert_eq!(
        state.last_error.as_deref(),
        Some("ERROR : a.txt: quota exceeded\nERROR : Bisync aborted")
    );
    assert_eq!(state.consecutive_failures, 1);
}

#[tokio::test]
async fn test_spawn_failure_is_unclassified_failure() {
    let fixture = Fixture::new(&["Desktop"]);
    let runner = ScriptedRunner::new();
    let (executor, registry) = fixture.executor(runner.clone(), &["Desktop"]);
    let path = fixture.dir("Desktop");

    runner.script("bisync", fixture.dir_str("Desktop"), Scripted::spawn_error());

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.run(dir).await;

    assert_eq!(report.attempts, 1);
    match report.outcome {
        SyncOutcome::Failed { error } => assert!(error.contains("Failed to start")),
        SyncOutcome::Success => panic!("spawn failure reported as success"),
    }
    assert_eq!(registry.status_of(&path), Some(SyncStatus::Error));
}

#[tokio::test]
async fn test_force_resync_order_survives_push_failure() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    runner.observe(&fixture.work_dir);
    let (executor, registry) = fixture.executor(runner.clone(), &["Documents"]);
    let path = fixture.dir("Documents");
    let target = fixture.dir_str("Documents");

    let dir = registry.try_begin_sync(&path).unwrap();
    registry.finish_success(&dir, Utc::now());

    let session = BisyncJanitor::session_name(&path, "gdrive:Documents");
    for suffix in ["lck", "path1.lst", "path2.lst", "path1.lst-new"] {
        std::fs::write(fixture.work_dir.join(format!("{session}.{suffix}")), b"x").unwrap();
    }
    runner.script("sync", &target, Scripted::fail(1, &["ERROR : Failed to sync: boom"]));

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.force_resync(dir).await;

    assert!(report.lock_cleared);
    assert_eq!(report.cache_files_removed, 3);
    assert!(!report.deletions_pushed);
    assert!(report.push_error.unwrap().contains("boom"));
    assert_eq!(report.outcome, SyncOutcome::Success);

    let calls = runner.calls();
    let commands: Vec<&str> = calls.iter().map(|c| c.args[0].as_str()).collect();
    assert_eq!(commands, ["sync", "bisync"]);
    assert_eq!(calls[0].observed_files, 0, "lock and cache cleared before push");
    assert!(calls[1].has("--resync"));

    let state = registry.state_of(&path).unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(!state.needs_initial_sync);
}

#[tokio::test]
async fn test_failed_force_resync_leaves_resync_pending() {
    let fixture = Fixture::new(&["Documents"]);
    let runner = ScriptedRunner::new();
    let (executor, registry) = fixture.executor(runner.clone(), &["Documents"]);
    let path = fixture.dir("Documents");

    let dir = registry.try_begin_sync(&path).unwrap();
    registry.finish_success(&dir, Utc::now());

    runner.script(
        "bisync",
        fixture.dir_str("Documents"),
        Scripted::fail(1, &["ERROR : network down"]),
    );

    let dir = registry.try_begin_sync(&path).unwrap();
    let report = executor.force_resync(dir).await;

    assert!(!report.outcome.is_success());
    assert!(report.deletions_pushed);
    let state = registry.state_of(&path).unwrap();
    assert_eq!(state.status, SyncStatus::Error);
    assert!(state.needs_initial_sync);
}
