//! D-Bus client for the CloudMirror daemon
//!
//! [`OrchestratorProxy`] and [`MaintenanceProxy`] mirror the interfaces in
//! [`service`](crate::service). [`CloudMirrorClient`] wraps both and decodes
//! the JSON replies, turning `{"success": false}` into an error.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

#[zbus::proxy(
    interface = "com.enigmora.CloudMirror.Orchestrator",
    default_service = "com.enigmora.CloudMirror",
    default_path = "/com/enigmora/CloudMirror"
)]
pub trait Orchestrator {
    fn status(&self) -> zbus::Result<String>;
    fn register(&self, local: &str, remote: &str) -> zbus::Result<String>;
    fn start(&self) -> zbus::Result<String>;
    fn stop(&self) -> zbus::Result<String>;
    fn sync_all(&self) -> zbus::Result<String>;
    fn sync_one(&self, path: &str) -> zbus::Result<String>;
    fn force_resync(&self, path: &str) -> zbus::Result<String>;
    fn list_excludes(&self) -> zbus::Result<String>;
    fn add_exclude(&self, pattern: &str) -> zbus::Result<String>;
    fn remove_exclude(&self, pattern: &str) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "com.enigmora.CloudMirror.Maintenance",
    default_service = "com.enigmora.CloudMirror",
    default_path = "/com/enigmora/CloudMirror"
)]
pub trait Maintenance {
    fn run(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

/// Decodes a service reply
///
/// # Errors
/// Fails on malformed JSON, or with the service's `error` message when
/// `success` is false.
pub fn parse_reply(reply: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(reply).context("Daemon sent a malformed reply")?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(anyhow!("{message}"));
    }
    Ok(value)
}

/// Session-bus client for the running daemon
pub struct CloudMirrorClient {
    orchestrator: OrchestratorProxy<'static>,
    maintenance: MaintenanceProxy<'static>,
}

impl CloudMirrorClient {
    /// Connects to the session bus
    ///
    /// # Errors
    /// Fails when the session bus is unavailable. A daemon that is not
    /// running surfaces on the first call, not here.
    pub async fn connect() -> Result<Self> {
        let connection = zbus::Connection::session()
            .await
            .context("Failed to connect to the D-Bus session bus")?;
        let orchestrator = OrchestratorProxy::new(&connection).await?;
        let maintenance = MaintenanceProxy::new(&connection).await?;
        Ok(Self {
            orchestrator,
            maintenance,
        })
    }

    pub async fn status(&self) -> Result<Value> {
        parse_reply(&self.orchestrator.status().await.context(NOT_REACHABLE)?)
    }

    pub async fn register(&self, local: &str, remote: &str) -> Result<Value> {
        parse_reply(&self.orchestrator.register(local, remote).await.context(NOT_REACHABLE)?)
    }

    pub async fn start(&self) -> Result<Value> {
        parse_reply(&self.orchestrator.start().await.context(NOT_REACHABLE)?)
    }

    pub async fn stop(&self) -> Result<Value> {
        parse_reply(&self.orchestrator.stop().await.context(NOT_REACHABLE)?)
    }

    pub async fn sync_all(&self) -> Result<Value> {
        parse_reply(&self.orchestrator.sync_all().await.context(NOT_REACHABLE)?)
    }

    pub async fn sync_one(&self, path: &str) -> Result<Value> {
        parse_reply(&self.orchestrator.sync_one(path).await.context(NOT_REACHABLE)?)
    }

    pub async fn force_resync(&self, path: &str) -> Result<Value> {
        parse_reply(&self.orchestrator.force_resync(path).await.context(NOT_REACHABLE)?)
    }

    pub async fn list_excludes(&self) -> Result<Value> {
        parse_reply(&self.orchestrator.list_excludes().await.context(NOT_REACHABLE)?)
    }

    pub async fn add_exclude(&self, pattern: &str) -> Result<Value> {
        parse_reply(&self.orchestrator.add_exclude(pattern).await.context(NOT_REACHABLE)?)
    }

    pub async fn remove_exclude(&self, pattern: &str) -> Result<Value> {
        parse_reply(&self.orchestrator.remove_exclude(pattern).await.context(NOT_REACHABLE)?)
    }

    pub async fn run_maintenance(&self) -> Result<Value> {
        parse_reply(&self.maintenance.run().await.context(NOT_REACHABLE)?)
    }

    pub async fn maintenance_status(&self) -> Result<Value> {
        parse_reply(&self.maintenance.status().await.context(NOT_REACHABLE)?)
    }
}

const NOT_REACHABLE: &str = "Could not reach cloudmirrord (is the daemon running?)";
