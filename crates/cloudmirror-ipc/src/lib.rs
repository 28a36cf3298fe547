//! CloudMirror IPC - D-Bus operator surface
//!
//! The daemon serves two interfaces on the session bus under
//! [`DBUS_NAME`](service::DBUS_NAME) at [`DBUS_PATH`](service::DBUS_PATH):
//!
//! - `com.enigmora.CloudMirror.Orchestrator` - directory registration,
//!   start/stop, status, sync triggers, forced resync and exclude patterns
//! - `com.enigmora.CloudMirror.Maintenance` - on-demand maintenance runs
//!
//! Every method returns a JSON string. Rejected operator requests come back
//! as `{"success": false, "error": "..."}` rather than D-Bus errors, so
//! clients only need one decoding path. [`client`] holds the matching
//! proxies used by the CLI.

pub mod client;
pub mod service;

pub use client::{parse_reply, CloudMirrorClient, MaintenanceProxy, OrchestratorProxy};
pub use service::{
    DbusService, MaintenanceInterface, OrchestratorInterface, DBUS_NAME, DBUS_PATH,
    MAINTENANCE_INTERFACE, ORCHESTRATOR_INTERFACE,
};
