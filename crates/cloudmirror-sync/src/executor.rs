//! Sync executor - one bisync run with bounded recovery
//!
//! The executor is handed a directory that has already passed the registry
//! gate (status `syncing`) and is responsible for releasing it: every path
//! through [`SyncExecutor::run`] ends in exactly one
//! [`finish_success`](DirectoryRegistry::finish_success) or
//! [`finish_failure`](DirectoryRegistry::finish_failure).
//!
//! ## Flow
//!
//! ```text
//! needs_initial_sync? ──yes──→ clear lock
//!          │
//!          ▼
//!       bisync ──→ classify
//!                    │
//!   stale lock ──────┼──→ clear lock, retry same invocation
//!   remote missing ──┼──→ mkdir remote, retry with --resync
//!   state missing ───┼──→ retry with --resync
//!                    ▼
//!        success → idle | anything else → error
//! ```
//!
//! Each recovery runs at most once per execution, in the order above. A
//! recovery's retry can fall into a later class and trigger that recovery,
//! never an earlier one. There is no backoff; the next periodic trigger
//! retries a failed directory.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use cloudmirror_core::domain::{ExcludeRules, SyncDirectory};
use cloudmirror_process::{CommandRunner, TracingSink};

use crate::{
    classify::{classify, error_summary, BisyncOutcome},
    janitor::BisyncJanitor,
    rclone::RcloneTool,
    registry::DirectoryRegistry,
};

/// Exclude rules shared between the orchestrator and its executor
pub type SharedExcludes = Arc<RwLock<ExcludeRules>>;

// ============================================================================
// Reports
// ============================================================================

/// Final result of an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    Failed { error: String },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success)
    }
}

/// A recovery action taken during an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// A stale lock file was removed and the run retried
    LockCleared,
    /// The remote directory was created and a resync run followed
    RemoteCreated,
    /// The run was retried with `--resync` to rebuild listings
    StateRebuilt,
}

/// What happened during one [`SyncExecutor::run`]
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub directory: String,
    pub remote: String,
    pub outcome: SyncOutcome,
    /// bisync invocations made, including retries
    pub attempts: u32,
    pub recoveries: Vec<Recovery>,
    /// Whether any invocation carried `--resync`
    pub used_resync: bool,
    pub duration_ms: u64,
}

/// What happened during one [`SyncExecutor::force_resync`]
#[derive(Debug, Clone, Serialize)]
pub struct ForceResyncReport {
    pub directory: String,
    pub remote: String,
    pub lock_cleared: bool,
    pub cache_files_removed: usize,
    /// Whether the one-way push of local deletions succeeded
    pub deletions_pushed: bool,
    pub push_error: Option<String>,
    pub outcome: SyncOutcome,
    pub duration_ms: u64,
}

struct Attempt {
    outcome: BisyncOutcome,
    summary: String,
}

// ============================================================================
// SyncExecutor
// ============================================================================

/// Runs bisync for one directory and resolves its registry status
pub struct SyncExecutor {
    runner: Arc<dyn CommandRunner>,
    tool: RcloneTool,
    janitor: BisyncJanitor,
    registry: Arc<DirectoryRegistry>,
    excludes: SharedExcludes,
}

impl SyncExecutor {
    /// Creates an executor; the janitor works in the tool's working directory
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        tool: RcloneTool,
        registry: Arc<DirectoryRegistry>,
        excludes: SharedExcludes,
    ) -> Self {
        let janitor = BisyncJanitor::new(tool.work_dir().clone());
        Self {
            runner,
            tool,
            janitor,
            registry,
            excludes,
        }
    }

    pub fn tool(&self) -> &RcloneTool {
        &self.tool
    }

    fn current_excludes(&self) -> ExcludeRules {
        self.excludes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn bisync(&self, directory: &SyncDirectory, excludes: &ExcludeRules, resync: bool) -> Attempt {
        let spec = self.tool.bisync(directory, excludes, resync);
        let sink = TracingSink::new(directory.local_path().display().to_string());
        debug!(path = %directory.local_path().display(), resync, "Running bisync");

        match self.runner.run(&spec, &sink).await {
            Ok(output) => Attempt {
                outcome: classify(&output),
                summary: error_summary(&output),
            },
            Err(e) => Attempt {
                outcome: BisyncOutcome::Failed,
                summary: e.to_string(),
            },
        }
    }

    // ========================================================================
    // Normal execution
    // ========================================================================

    /// Synchronizes `directory` and releases its gate
    ///
    /// `directory` must be the value returned by
    /// [`DirectoryRegistry::try_begin_sync`].
    pub async fn run(&self, directory: SyncDirectory) -> ExecutionReport {
        let started = Instant::now();
        let path = directory.local_path().display().to_string();
        let excludes = self.current_excludes();
        let mut resync = directory.needs_initial_sync();
        let mut used_resync = resync;
        let mut recoveries = Vec::new();

        info!(path = %path, remote = %directory.remote_path(), resync, "Starting sync");

        if resync {
            if let Err(e) = self.janitor.clear_lock(&directory).await {
                warn!(path = %path, error = %e, "Could not clear lock before initial sync");
            }
        }

        let mut attempts = 1;
        let mut attempt = self.bisync(&directory, &excludes, resync).await;

        if attempt.outcome == BisyncOutcome::StaleLock {
            match self.janitor.clear_lock(&directory).await {
                Ok(_) => {
                    info!(path = %path, "Stale lock cleared, retrying");
                    recoveries.push(Recovery::LockCleared);
                    attempts += 1;
                    attempt = self.bisync(&directory, &excludes, resync).await;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to clear stale lock");
                }
            }
        }

        if attempt.outcome == BisyncOutcome::RemoteMissing {
            let mkdir = self.tool.mkdir(directory.remote_path());
            match self.runner.run(&mkdir, &TracingSink::new(path.clone())).await {
                Ok(output) if output.success() => {
                    info!(path = %path, remote = %directory.remote_path(), "Created missing remote directory");
                }
                Ok(output) => {
                    warn!(path = %path, exit_code = output.exit_code, "rclone mkdir failed");
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "rclone mkdir failed");
                }
            }
            recoveries.push(Recovery::RemoteCreated);
            resync = true;
            used_resync = true;
            attempts += 1;
            attempt = self.bisync(&directory, &excludes, resync).await;
        }

        if attempt.outcome == BisyncOutcome::StateMissing {
            info!(path = %path, "Sync state missing, retrying with resync");
            recoveries.push(Recovery::StateRebuilt);
            resync = true;
            used_resync = true;
            attempts += 1;
            attempt = self.bisync(&directory, &excludes, resync).await;
        }

        let outcome = self.resolve(&directory, attempt);
        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            SyncOutcome::Success => {
                info!(path = %path, attempts, duration_ms, "Sync completed");
            }
            SyncOutcome::Failed { error } => {
                error!(path = %path, attempts, duration_ms, error = %error, "Sync failed");
            }
        }

        ExecutionReport {
            directory: path,
            remote: directory.remote_path().to_string(),
            outcome,
            attempts,
            recoveries,
            used_resync,
            duration_ms,
        }
    }

    fn resolve(&self, directory: &SyncDirectory, attempt: Attempt) -> SyncOutcome {
        if attempt.outcome == BisyncOutcome::Success {
            self.registry.finish_success(directory, Utc::now());
            SyncOutcome::Success
        } else {
            self.registry.finish_failure(directory, attempt.summary.clone());
            SyncOutcome::Failed {
                error: attempt.summary,
            }
        }
    }

    // ========================================================================
    // Force resync
    // ========================================================================

    /// Rebuilds the tool's state for `directory` from the local side
    ///
    /// Clears the lock and all listing files, pushes local deletions one way,
    /// then runs a full resync. A failed push is recorded and the resync runs
    /// anyway. Like [`run`](Self::run), releases the gate.
    pub async fn force_resync(&self, directory: SyncDirectory) -> ForceResyncReport {
        let started = Instant::now();
        let path = directory.local_path().display().to_string();
        let excludes = self.current_excludes();
        let sink = TracingSink::new(path.clone());

        info!(path = %path, remote = %directory.remote_path(), "Starting forced resync");
        self.registry.request_full_resync(directory.local_path());

        let lock_cleared = self.janitor.clear_lock(&directory).await.unwrap_or_else(|e| {
            warn!(path = %path, error = %e, "Failed to clear lock");
            false
        });
        let cache_files_removed = self.janitor.clear_cache(&directory).await.unwrap_or_else(|e| {
            warn!(path = %path, error = %e, "Failed to clear listing cache");
            0
        });

        let push_error = match self.runner.run(&self.tool.push(&directory, &excludes), &sink).await {
            Ok(output) if output.success() => None,
            Ok(output) => Some(error_summary(&output)),
            Err(e) => Some(e.to_string()),
        };
        if let Some(err) = &push_error {
            warn!(path = %path, error = %err, "Pushing local deletions failed, continuing with resync");
        }

        let attempt = self.bisync(&directory, &excludes, true).await;
        let outcome = self.resolve(&directory, attempt);
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(path = %path, success = outcome.is_success(), duration_ms, "Forced resync finished");

        ForceResyncReport {
            directory: path,
            remote: directory.remote_path().to_string(),
            lock_cleared,
            cache_files_removed,
            deletions_pushed: push_error.is_none(),
            push_error,
            outcome,
            duration_ms,
        }
    }
}
