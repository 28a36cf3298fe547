//! Sync orchestrator - triggers, queue processing and operator commands
//!
//! The [`SyncOrchestrator`] owns the registry, the queue and the executor,
//! and runs two background loops while started:
//!
//! ## Flow
//!
//! ```text
//! periodic ticker ─┐
//! operator sync ───┼──→ SyncQueue ──→ queue processor ──→ SyncExecutor task
//! startup ─────────┘      (dedup)       (1 per tick,        (one per directory,
//!                                         oldest free)        gate held)
//! ```
//!
//! Executions run as independent tasks tracked by a [`TaskTracker`], so a
//! slow directory never delays the next tick. Stopping closes the queue,
//! cancels both loops and waits for in-flight executions to finish.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{Mutex, Semaphore},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use cloudmirror_core::{
    config::Config,
    domain::{DirectoryState, ExcludeRules, SyncDirectory},
};
use cloudmirror_process::{CommandRunner, NullSink};

use crate::{
    classify::error_summary,
    error::OrchestratorError,
    executor::{ForceResyncReport, SharedExcludes, SyncExecutor},
    queue::{EnqueueResult, SyncQueue},
    rclone::RcloneTool,
    registry::{DirectoryRegistry, RegisterOutcome},
};

// ============================================================================
// Settings and status
// ============================================================================

/// Timing and limits for the orchestrator loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// rclone remote name, without the trailing `:`
    pub remote_name: String,
    /// Period of the re-enqueue-everything trigger
    pub poll_interval: Duration,
    /// Period of the queue processor
    pub tick_interval: Duration,
    /// Cap on concurrent executions; `None` is unbounded
    pub max_concurrent: Option<usize>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let max = config.sync.max_concurrent_syncs as usize;
        Self {
            remote_name: config.sync.remote_name().to_string(),
            poll_interval: Duration::from_secs(config.sync.poll_interval_secs),
            tick_interval: Duration::from_millis(config.sync.tick_interval_ms),
            max_concurrent: (max > 0).then_some(max),
        }
    }
}

/// Snapshot returned by [`SyncOrchestrator::status`]
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub queue_size: usize,
    pub directories: Vec<DirectoryState>,
}

// ============================================================================
// Gate guard
// ============================================================================

/// Releases a directory's gate if its task ends without resolving it
///
/// Covers panics inside the executor and tasks dropped by runtime shutdown.
struct GateGuard {
    registry: Arc<DirectoryRegistry>,
    directory: Option<SyncDirectory>,
}

impl GateGuard {
    fn new(registry: Arc<DirectoryRegistry>, directory: SyncDirectory) -> Self {
        Self {
            registry,
            directory: Some(directory),
        }
    }

    fn disarm(mut self) {
        self.directory = None;
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if let Some(directory) = self.directory.take() {
            error!(path = %directory.local_path().display(), "Sync task ended abnormally");
            self.registry
                .finish_failure(&directory, "sync task ended abnormally");
        }
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct Inner {
    settings: OrchestratorSettings,
    registry: Arc<DirectoryRegistry>,
    queue: SyncQueue,
    executor: SyncExecutor,
    excludes: SharedExcludes,
    runner: Arc<dyn CommandRunner>,
    limit: Option<Arc<Semaphore>>,
    tasks: TaskTracker,
}

impl Inner {
    fn enqueue(&self, path: &Path) -> EnqueueResult {
        let retries = self.registry.consecutive_failures(path);
        self.queue.enqueue(path, retries)
    }

    fn enqueue_all(&self) -> usize {
        let mut queued = 0;
        for directory in self.registry.all_directories() {
            if self.enqueue(directory.local_path()) != EnqueueResult::Closed {
                queued += 1;
            }
        }
        queued
    }

    /// Dispatches at most one queued directory; returns whether one started
    fn dispatch_next(self: &Arc<Self>) -> bool {
        let permit = match &self.limit {
            Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => return false,
            },
            None => None,
        };

        let Some((operation, directory)) = self
            .queue
            .take_oldest_with(|op| self.registry.try_begin_sync(op.directory()))
        else {
            return false;
        };

        debug!(
            path = %operation.directory().display(),
            retry_count = operation.retry_count(),
            "Dispatching sync"
        );

        let inner = Arc::clone(self);
        self.tasks.spawn(async move {
            let _permit = permit;
            let guard = GateGuard::new(Arc::clone(&inner.registry), directory.clone());
            inner.executor.run(directory).await;
            guard.disarm();
        });
        true
    }

    async fn processor_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            "Queue processor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.dispatch_next();
                }
            }
        }

        info!("Queue processor stopped");
    }

    async fn periodic_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.settings.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(poll_secs = period.as_secs(), "Periodic sync trigger started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let queued = self.enqueue_all();
                    debug!(queued, "Periodic trigger enqueued directories");
                }
            }
        }

        info!("Periodic sync trigger stopped");
    }
}

struct RunHandle {
    cancel: CancellationToken,
    processor: JoinHandle<()>,
    periodic: JoinHandle<()>,
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Drives bidirectional sync of every registered directory
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
    run: Mutex<Option<RunHandle>>,
    running: AtomicBool,
    remote_verified: AtomicBool,
}

impl SyncOrchestrator {
    /// Creates a stopped orchestrator with no registered directories
    pub fn new(
        settings: OrchestratorSettings,
        tool: RcloneTool,
        excludes: ExcludeRules,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let registry = Arc::new(DirectoryRegistry::new());
        let excludes: SharedExcludes = Arc::new(RwLock::new(excludes));
        let executor = SyncExecutor::new(
            Arc::clone(&runner),
            tool,
            Arc::clone(&registry),
            Arc::clone(&excludes),
        );
        let limit = settings
            .max_concurrent
            .map(|n| Arc::new(Semaphore::new(n)));

        let queue = SyncQueue::new();
        queue.close();

        Self {
            inner: Arc::new(Inner {
                settings,
                registry,
                queue,
                executor,
                excludes,
                runner,
                limit,
                tasks: TaskTracker::new(),
            }),
            run: Mutex::new(None),
            running: AtomicBool::new(false),
            remote_verified: AtomicBool::new(false),
        }
    }

    /// Builds an orchestrator from the `sync` and `rclone` config sections
    ///
    /// # Errors
    /// Returns [`OrchestratorError::Domain`] if an exclude pattern is invalid.
    pub fn from_config(
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, OrchestratorError> {
        let excludes = ExcludeRules::new(config.sync.excludes.iter().cloned())?;
        Ok(Self::new(
            OrchestratorSettings::from_config(config),
            RcloneTool::from_config(&config.rclone),
            excludes,
            runner,
        ))
    }

    pub fn registry(&self) -> &DirectoryRegistry {
        &self.inner.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // ========================================================================
    // Startup checks
    // ========================================================================

    /// Checks that the remote is configured and answers a listing
    ///
    /// # Errors
    /// [`OrchestratorError::RemoteNotConfigured`] if `rclone listremotes`
    /// does not name the remote, [`OrchestratorError::RemoteUnreachable`] if
    /// probing it fails, [`OrchestratorError::Process`] if rclone cannot run.
    pub async fn verify_remote(&self) -> Result<(), OrchestratorError> {
        let remote = self.inner.settings.remote_name.clone();
        let tool = self.inner.executor.tool();

        let listed = self.inner.runner.run(&tool.list_remotes(), &NullSink).await?;
        let configured = listed.success()
            && listed
                .lines
                .iter()
                .any(|l| l.text.trim().trim_end_matches(':') == remote);
        if !configured {
            return Err(OrchestratorError::RemoteNotConfigured(remote));
        }

        let probe = match self.inner.runner.run(&tool.probe(&remote), &NullSink).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(error_summary(&output)),
            Err(e) => Err(e.to_string()),
        };
        if let Err(detail) = probe {
            return Err(OrchestratorError::RemoteUnreachable { remote, detail });
        }

        info!(remote = %remote, "Remote verified");
        self.remote_verified.store(true, Ordering::Release);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts the queue processor and periodic trigger, enqueueing every directory
    ///
    /// Verifies the remote first unless that already succeeded.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(OrchestratorError::AlreadyRunning);
        }
        if !self.remote_verified.load(Ordering::Acquire) {
            self.verify_remote().await?;
        }

        self.inner.queue.reopen();
        self.inner.tasks.reopen();
        let queued = self.inner.enqueue_all();

        let cancel = CancellationToken::new();
        let processor = tokio::spawn(Arc::clone(&self.inner).processor_loop(cancel.clone()));
        let periodic = tokio::spawn(Arc::clone(&self.inner).periodic_loop(cancel.clone()));

        *run = Some(RunHandle {
            cancel,
            processor,
            periodic,
        });
        self.running.store(true, Ordering::Release);

        info!(directories = queued, "Orchestrator started");
        Ok(())
    }

    /// Stops both loops and waits for in-flight executions
    ///
    /// Pending queue entries are dropped; the next start re-enqueues every
    /// directory.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        let mut run = self.run.lock().await;
        let handle = run.take().ok_or(OrchestratorError::NotRunning)?;
        self.running.store(false, Ordering::Release);

        self.inner.queue.close();
        let dropped = self.inner.queue.clear();
        handle.cancel.cancel();

        for (name, task) in [("processor", handle.processor), ("periodic", handle.periodic)] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "Orchestrator loop ended abnormally");
            }
        }

        let in_flight = self.inner.tasks.len();
        if in_flight > 0 {
            info!(in_flight, "Waiting for running syncs to finish");
        }
        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        info!(dropped, "Orchestrator stopped");
        Ok(())
    }

    // ========================================================================
    // Operator commands
    // ========================================================================

    /// Registers a directory pair; queues it right away when running
    pub fn register(&self, local: &Path, remote: &str) -> Result<SyncDirectory, OrchestratorError> {
        let (directory, outcome) = self.inner.registry.register(local, remote)?;
        if outcome != RegisterOutcome::Unchanged && self.is_running() {
            self.inner.enqueue(directory.local_path());
        }
        Ok(directory)
    }

    /// Queues every registered directory
    pub fn sync_all(&self) -> Result<usize, OrchestratorError> {
        if !self.inner.queue.is_open() {
            return Err(OrchestratorError::NotRunning);
        }
        Ok(self.inner.enqueue_all())
    }

    /// Queues one directory
    pub fn sync_one(&self, path: &Path) -> Result<PathBuf, OrchestratorError> {
        let key = self.resolve(path)?;
        match self.inner.enqueue(&key) {
            EnqueueResult::Closed => Err(OrchestratorError::NotRunning),
            _ => Ok(key),
        }
    }

    /// Starts a forced resync of one directory in the background
    ///
    /// The gate is taken before this returns, so a busy directory is
    /// rejected immediately. The handle yields the report when done.
    pub fn force_resync(
        &self,
        path: &Path,
    ) -> Result<JoinHandle<ForceResyncReport>, OrchestratorError> {
        let key = self.resolve(path)?;
        let directory = self
            .inner
            .registry
            .try_begin_sync(&key)
            .ok_or_else(|| OrchestratorError::DirectoryBusy(key.clone()))?;

        let inner = Arc::clone(&self.inner);
        let task = self.inner.tasks.track_future(async move {
            let guard = GateGuard::new(Arc::clone(&inner.registry), directory.clone());
            let report = inner.executor.force_resync(directory).await;
            guard.disarm();
            report
        });
        Ok(tokio::spawn(task))
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.is_running(),
            queue_size: self.inner.queue.len(),
            directories: self.inner.registry.snapshot(),
        }
    }

    pub fn excludes(&self) -> Vec<String> {
        self.inner
            .excludes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .patterns()
            .to_vec()
    }

    /// Adds an exclude pattern; applies from the next bisync invocation
    pub fn add_exclude(&self, pattern: &str) -> Result<(), OrchestratorError> {
        self.inner
            .excludes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(pattern)?;
        info!(pattern, "Added exclude pattern");
        Ok(())
    }

    pub fn remove_exclude(&self, pattern: &str) -> Result<(), OrchestratorError> {
        self.inner
            .excludes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(pattern)?;
        info!(pattern, "Removed exclude pattern");
        Ok(())
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, OrchestratorError> {
        self.inner
            .registry
            .resolve(path)
            .ok_or_else(|| OrchestratorError::UnknownDirectory(path.to_path_buf()))
    }
}
