//! D-Bus service implementation for CloudMirror
//!
//! Exposes the running daemon's orchestrator and maintenance sequencer to
//! operators:
//!
//! - `com.enigmora.CloudMirror.Orchestrator` - Directory and sync control
//! - `com.enigmora.CloudMirror.Maintenance` - On-demand maintenance runs
//!
//! Methods never fail at the D-Bus level for operator mistakes. Each one
//! returns a JSON object with a `success` field and either its payload or
//! an `error` message.

use std::{fmt::Display, path::PathBuf, sync::Arc};

use cloudmirror_core::config::Config;
use cloudmirror_maintenance::MaintenanceSequencer;
use cloudmirror_sync::SyncOrchestrator;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// D-Bus well-known name for the CloudMirror daemon
pub const DBUS_NAME: &str = "com.enigmora.CloudMirror";

/// D-Bus object path for the service
pub const DBUS_PATH: &str = "/com/enigmora/CloudMirror";

/// Interface name of [`OrchestratorInterface`]
pub const ORCHESTRATOR_INTERFACE: &str = "com.enigmora.CloudMirror.Orchestrator";

/// Interface name of [`MaintenanceInterface`]
pub const MAINTENANCE_INTERFACE: &str = "com.enigmora.CloudMirror.Maintenance";

// ============================================================================
// Response helpers
// ============================================================================

/// `{"success": true, ...payload}`; a non-object payload lands under `result`
fn ok_response(payload: Value) -> String {
    let mut body = match payload {
        Value::Object(map) => Value::Object(map),
        Value::Null => json!({}),
        other => json!({ "result": other }),
    };
    body["success"] = Value::Bool(true);
    body.to_string()
}

fn error_response(error: impl Display) -> String {
    json!({ "success": false, "error": error.to_string() }).to_string()
}

// ============================================================================
// Orchestrator interface
// ============================================================================

/// D-Bus interface for directory and sync control
///
/// Holds the daemon's configuration so that remote paths given without a
/// `name:` prefix are qualified with the configured remote, and so that
/// exclude changes can be written back to the config file.
pub struct OrchestratorInterface {
    orchestrator: Arc<SyncOrchestrator>,
    config: Arc<Mutex<Config>>,
    config_path: Option<PathBuf>,
}

impl OrchestratorInterface {
    /// Creates the interface; exclude changes are persisted to `config_path`
    /// when one is given
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        config: Arc<Mutex<Config>>,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            orchestrator,
            config,
            config_path,
        }
    }

    /// Writes the current exclude set to the config file
    ///
    /// Returns whether the file was written. The in-memory rule set has
    /// already changed either way.
    async fn persist_excludes(&self) -> bool {
        let Some(path) = &self.config_path else {
            return false;
        };

        // Held across the write: saves land in edit order
        let mut config = self.config.lock().await;
        config.sync.excludes = self.orchestrator.excludes();
        let snapshot = config.clone();
        let target = path.clone();
        let saved = tokio::task::spawn_blocking(move || snapshot.save(&target))
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("save task failed: {e}")));
        match saved {
            Ok(()) => {
                debug!(path = %path.display(), "Persisted exclude patterns");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to persist exclude patterns");
                false
            }
        }
    }
}

#[zbus::interface(name = "com.enigmora.CloudMirror.Orchestrator")]
impl OrchestratorInterface {
    /// Returns the orchestrator status as a JSON string
    ///
    /// The returned JSON contains:
    /// - `running`: Whether the trigger loops are active
    /// - `queue_size`: Pending sync requests
    /// - `directories`: One entry per registered directory with its status,
    ///   last sync time, last error and consecutive failure count
    async fn status(&self) -> String {
        match serde_json::to_value(self.orchestrator.status()) {
            Ok(status) => ok_response(status),
            Err(e) => error_response(e),
        }
    }

    /// Registers a local directory with a remote path
    ///
    /// A remote without a `name:` prefix is placed under the configured
    /// remote.
    async fn register(&self, local: String, remote: String) -> String {
        let remote = self.config.lock().await.sync.qualify_remote(&remote);
        info!(local = %local, remote = %remote, "D-Bus: register requested");

        match self.orchestrator.register(&PathBuf::from(&local), &remote) {
            Ok(directory) => ok_response(json!({
                "directory": directory.local_path(),
                "remote": directory.remote_path(),
            })),
            Err(e) => error_response(e),
        }
    }

    /// Starts the orchestrator, verifying the remote first
    async fn start(&self) -> String {
        info!("D-Bus: start requested");
        match self.orchestrator.start().await {
            Ok(()) => ok_response(json!({ "running": true })),
            Err(e) => error_response(e),
        }
    }

    /// Stops the orchestrator, returning once in-flight syncs have finished
    async fn stop(&self) -> String {
        info!("D-Bus: stop requested");
        match self.orchestrator.stop().await {
            Ok(()) => ok_response(json!({ "running": false })),
            Err(e) => error_response(e),
        }
    }

    /// Queues every registered directory
    async fn sync_all(&self) -> String {
        info!("D-Bus: sync all requested");
        match self.orchestrator.sync_all() {
            Ok(queued) => ok_response(json!({ "queued": queued })),
            Err(e) => error_response(e),
        }
    }

    /// Queues one directory
    async fn sync_one(&self, path: String) -> String {
        info!(path = %path, "D-Bus: sync requested");
        match self.orchestrator.sync_one(&PathBuf::from(&path)) {
            Ok(directory) => ok_response(json!({ "directory": directory })),
            Err(e) => error_response(e),
        }
    }

    /// Starts a forced resync of one directory
    ///
    /// Returns as soon as the directory's gate is taken; the outcome is
    /// logged and shows up in [`status`](Self::status).
    async fn force_resync(&self, path: String) -> String {
        info!(path = %path, "D-Bus: forced resync requested");
        match self.orchestrator.force_resync(&PathBuf::from(&path)) {
            Ok(handle) => {
                let started = json!({ "directory": path, "started": true });
                tokio::spawn(async move {
                    match handle.await {
                        Ok(report) => info!(
                            path = %report.directory,
                            success = report.outcome.is_success(),
                            deletions_pushed = report.deletions_pushed,
                            "D-Bus: forced resync finished"
                        ),
                        Err(e) => warn!(error = %e, "D-Bus: forced resync task failed"),
                    }
                });
                ok_response(started)
            }
            Err(e) => error_response(e),
        }
    }

    /// Returns the active exclude patterns
    async fn list_excludes(&self) -> String {
        ok_response(json!({ "excludes": self.orchestrator.excludes() }))
    }

    /// Adds an exclude pattern and writes it to the config file
    async fn add_exclude(&self, pattern: String) -> String {
        info!(pattern = %pattern, "D-Bus: add exclude requested");
        if let Err(e) = self.orchestrator.add_exclude(&pattern) {
            return error_response(e);
        }
        let persisted = self.persist_excludes().await;
        ok_response(json!({
            "pattern": pattern,
            "excludes": self.orchestrator.excludes(),
            "persisted": persisted,
        }))
    }

    /// Removes an exclude pattern and writes the change to the config file
    async fn remove_exclude(&self, pattern: String) -> String {
        info!(pattern = %pattern, "D-Bus: remove exclude requested");
        if let Err(e) = self.orchestrator.remove_exclude(&pattern) {
            return error_response(e);
        }
        let persisted = self.persist_excludes().await;
        ok_response(json!({
            "pattern": pattern,
            "excludes": self.orchestrator.excludes(),
            "persisted": persisted,
        }))
    }
}

// ============================================================================
// Maintenance interface
// ============================================================================

/// D-Bus interface for the maintenance sequencer
pub struct MaintenanceInterface {
    sequencer: Arc<MaintenanceSequencer>,
}

impl MaintenanceInterface {
    pub fn new(sequencer: Arc<MaintenanceSequencer>) -> Self {
        Self { sequencer }
    }
}

#[zbus::interface(name = "com.enigmora.CloudMirror.Maintenance")]
impl MaintenanceInterface {
    /// Starts a maintenance run in the background
    ///
    /// Package upgrades routinely outlast a D-Bus call timeout, so this
    /// returns immediately. Poll [`status`](Self::status) for the report.
    async fn run(&self) -> String {
        info!("D-Bus: maintenance run requested");
        if self.sequencer.steps().is_empty() {
            return error_response(cloudmirror_maintenance::MaintenanceError::NoSteps);
        }
        if self.sequencer.is_running() {
            return error_response(cloudmirror_maintenance::MaintenanceError::AlreadyRunning);
        }

        let sequencer = Arc::clone(&self.sequencer);
        tokio::spawn(async move {
            if let Err(e) = sequencer.run().await {
                warn!(error = %e, "D-Bus: maintenance run did not start");
            }
        });
        ok_response(json!({ "started": true, "steps": self.sequencer.steps().len() }))
    }

    /// Returns whether a run is in progress, the configured step names and
    /// the most recent report
    async fn status(&self) -> String {
        let steps: Vec<&str> = self
            .sequencer
            .steps()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        ok_response(json!({
            "running": self.sequencer.is_running(),
            "steps": steps,
            "last_report": self.sequencer.last_report(),
        }))
    }
}

// ============================================================================
// DbusService
// ============================================================================

/// D-Bus service manager
///
/// Owns the interfaces and registers them on the session bus.
pub struct DbusService {
    orchestrator: Arc<SyncOrchestrator>,
    maintenance: Arc<MaintenanceSequencer>,
    config: Arc<Mutex<Config>>,
    config_path: Option<PathBuf>,
}

impl DbusService {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        maintenance: Arc<MaintenanceSequencer>,
        config: Config,
    ) -> Self {
        Self {
            orchestrator,
            maintenance,
            config: Arc::new(Mutex::new(config)),
            config_path: None,
        }
    }

    /// Persists exclude changes made over D-Bus to `path`
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Starts the D-Bus service on the session bus
    ///
    /// Registers both interfaces and requests the well-known name.
    /// Returns the connection which must be kept alive for the service
    /// to remain active.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The session bus is not available
    /// - The well-known name is already owned (another instance running)
    /// - Interface registration fails
    pub async fn start(&self) -> anyhow::Result<zbus::Connection> {
        info!("Starting D-Bus service on session bus");

        let orchestrator = OrchestratorInterface::new(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.config),
            self.config_path.clone(),
        );
        let maintenance = MaintenanceInterface::new(Arc::clone(&self.maintenance));

        let connection = zbus::connection::Builder::session()?
            .name(DBUS_NAME)?
            .serve_at(DBUS_PATH, orchestrator)?
            .serve_at(DBUS_PATH, maintenance)?
            .build()
            .await?;

        info!(
            name = DBUS_NAME,
            path = DBUS_PATH,
            "D-Bus service started successfully"
        );

        Ok(connection)
    }

    /// Checks whether another process already owns the well-known name
    ///
    /// Returns `true` when the name is free.
    pub async fn try_acquire_name() -> anyhow::Result<bool> {
        let connection = zbus::Connection::session().await?;
        let dbus_proxy = zbus::fdo::DBusProxy::new(&connection).await?;

        match dbus_proxy.get_name_owner(DBUS_NAME.try_into()?).await {
            Ok(_owner) => Ok(false),
            Err(_) => Ok(true),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
