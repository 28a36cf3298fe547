//! Orchestrator error types
//!
//! Every variant here is an operator-facing or startup error. Failures of
//! individual sync runs never surface as errors; they are recorded on the
//! directory and reported through status.

use std::path::PathBuf;

use thiserror::Error;

use cloudmirror_core::domain::DomainError;
use cloudmirror_process::ProcessError;

/// Errors returned by [`SyncOrchestrator`](crate::SyncOrchestrator) operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The remote is not listed by `rclone listremotes`
    #[error("Remote '{0}' is not configured in rclone")]
    RemoteNotConfigured(String),

    /// The remote is configured but could not be listed
    #[error("Remote '{remote}' is unreachable: {detail}")]
    RemoteUnreachable { remote: String, detail: String },

    /// The path is not a registered directory
    #[error("Unknown directory: {}", .0.display())]
    UnknownDirectory(PathBuf),

    /// The directory is being synchronized right now
    #[error("Directory is busy syncing: {}", .0.display())]
    DirectoryBusy(PathBuf),

    #[error("Orchestrator is not running")]
    NotRunning,

    #[error("Orchestrator is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}
