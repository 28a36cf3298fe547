//! CloudMirror Daemon - Background synchronization service
//!
//! This binary runs as a systemd user service and handles:
//! - Bidirectional sync of the configured directories through rclone bisync
//! - D-Bus interface for the CLI
//! - Scheduled system maintenance (when enabled)
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! ## Startup
//!
//! ```text
//! load config ─→ init tracing ─→ validate ─→ check D-Bus name is free
//!      │
//!      ▼
//! verify remote ─→ register directories ─→ start orchestrator
//!      │
//!      ▼
//! serve D-Bus ─→ schedule maintenance ─→ wait for signal
//! ```
//!
//! Any failure before the orchestrator starts aborts the daemon.
//!
//! ## Shutdown
//!
//! The first SIGINT/SIGTERM stops the orchestrator and waits for running
//! rclone invocations to finish. A second signal cancels the runner's kill
//! token, terminating those child processes so the daemon can exit.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use cloudmirror_core::config::{Config, LoggingConfig};
use cloudmirror_ipc::{DbusService, DBUS_NAME};
use cloudmirror_maintenance::MaintenanceSequencer;
use cloudmirror_process::TokioCommandRunner;
use cloudmirror_sync::SyncOrchestrator;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Configuration
// ============================================================================

/// Loads the config file, falling back to defaults when it does not exist
///
/// A file that exists but cannot be parsed is an error.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Fails with every validation error joined into one message
fn validate_config(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
    bail!("Invalid configuration:\n  {}", details.join("\n  "))
}

/// Installs the global subscriber
///
/// `RUST_LOG` overrides `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the orchestrator, the maintenance sequencer and the D-Bus service
struct DaemonService {
    config: Config,
    config_path: PathBuf,
    orchestrator: Arc<SyncOrchestrator>,
    maintenance: Arc<MaintenanceSequencer>,
    /// Cancelled by the first shutdown signal
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(
        config: Config,
        config_path: PathBuf,
        runner: Arc<TokioCommandRunner>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let orchestrator = SyncOrchestrator::from_config(&config, runner.clone())
            .context("Failed to build the sync orchestrator")?;
        let maintenance = MaintenanceSequencer::from_config(runner, &config.maintenance.steps);

        Ok(Self {
            config,
            config_path,
            orchestrator: Arc::new(orchestrator),
            maintenance: Arc::new(maintenance),
            shutdown,
        })
    }

    /// Registers every configured directory that exists on disk
    ///
    /// Absent directories are skipped with a warning rather than failing
    /// startup; the default list names directories not every user has.
    fn register_directories(&self) -> usize {
        let mut registered = 0;
        for (local, remote) in self.config.sync.resolved_directories() {
            if !local.is_dir() {
                warn!(path = %local.display(), "Skipping directory that does not exist");
                continue;
            }
            match self.orchestrator.register(&local, &remote) {
                Ok(_) => registered += 1,
                Err(e) => {
                    warn!(path = %local.display(), remote = %remote, error = %e, "Skipping directory");
                }
            }
        }
        registered
    }

    /// Runs the daemon until the shutdown token is cancelled
    async fn run(&self) -> Result<()> {
        match DbusService::try_acquire_name().await {
            Ok(true) => {}
            Ok(false) => bail!(
                "Another instance of cloudmirrord is already running (D-Bus name {} is taken). \
                 Use 'cloudmirror daemon stop' to stop it first.",
                DBUS_NAME
            ),
            Err(e) => return Err(e).context("Failed to query the D-Bus session bus"),
        }

        self.orchestrator
            .verify_remote()
            .await
            .context("Remote check failed")?;

        let registered = self.register_directories();
        if registered == 0 {
            warn!("No directories registered; use 'cloudmirror register' to add one");
        }

        self.orchestrator
            .start()
            .await
            .context("Failed to start the orchestrator")?;

        let dbus_service = DbusService::new(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.maintenance),
            self.config.clone(),
        )
        .with_config_path(self.config_path.clone());

        let _dbus_connection = match dbus_service.start().await {
            Ok(conn) => conn,
            Err(e) => {
                self.stop_orchestrator().await;
                return Err(e).context("Failed to start D-Bus service");
            }
        };

        let maintenance_task = if self.config.maintenance.enabled {
            let interval = Duration::from_secs(self.config.maintenance.interval_hours * 3600);
            Some(tokio::spawn(
                Arc::clone(&self.maintenance).run_periodically(interval, self.shutdown.child_token()),
            ))
        } else {
            info!("Scheduled maintenance disabled");
            None
        };

        info!(directories = registered, "cloudmirrord ready");
        self.shutdown.cancelled().await;
        info!("Shutting down");

        self.stop_orchestrator().await;

        if let Some(task) = maintenance_task {
            if let Err(e) = task.await {
                warn!(error = %e, "Maintenance schedule ended abnormally");
            }
        }

        Ok(())
    }

    async fn stop_orchestrator(&self) {
        if let Err(e) = self.orchestrator.stop().await {
            warn!(error = %e, "Orchestrator stop reported an error");
        }
    }
}

// ============================================================================
// Shutdown signal handling
// ============================================================================

/// SIGINT and SIGTERM listeners, installed before the daemon starts
struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Waits for the next signal and returns its name
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    /// First signal cancels `shutdown`, second cancels `kill`
    async fn watch(mut self, shutdown: CancellationToken, kill: CancellationToken) {
        let name = self.recv().await;
        info!(signal = name, "Received shutdown signal, waiting for running syncs");
        shutdown.cancel();

        let name = self.recv().await;
        warn!(signal = name, "Received second signal, terminating child processes");
        kill.cancel();
    }
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();
    let config = load_config(&config_path)?;

    init_tracing(&config.logging);
    info!(config_path = %config_path.display(), "cloudmirrord starting");

    if let Err(e) = validate_config(&config) {
        error!("{e:#}");
        return Err(e);
    }

    let shutdown = CancellationToken::new();
    let kill = CancellationToken::new();

    let signals = ShutdownSignals::install().context("Failed to install signal handlers")?;
    tokio::spawn(signals.watch(shutdown.clone(), kill.clone()));

    let runner = Arc::new(TokioCommandRunner::with_kill_token(kill));
    let service = DaemonService::new(config, config_path, runner, shutdown)?;

    let result = service.run().await;

    match &result {
        Ok(()) => info!("cloudmirrord shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "cloudmirrord exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
