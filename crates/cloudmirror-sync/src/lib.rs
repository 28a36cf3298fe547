//! CloudMirror Sync - bidirectional directory-sync orchestrator
//!
//! Provides:
//! - A registry of directory pairs with a per-directory exclusivity gate
//! - A deduplicating sync queue fed by periodic, startup and operator triggers
//! - A queue processor dispatching each directory as an independent task
//! - An executor wrapping `rclone bisync` with bounded, classified recovery
//! - A janitor for bisync lock and listing files
//!
//! ## Modules
//!
//! - [`orchestrator`] - Lifecycle, trigger loops and operator commands
//! - [`executor`] - One bisync run with recovery, and the forced resync path
//! - [`classify`] - Text patterns mapping tool output to outcomes
//! - [`registry`] - Registered directories and their status
//! - [`queue`] - Pending sync requests, one per directory
//! - [`rclone`] - Command lines for the rclone invocations
//! - [`janitor`] - Lock and cache file cleanup

pub mod classify;
pub mod error;
pub mod executor;
pub mod janitor;
pub mod orchestrator;
pub mod queue;
pub mod rclone;
pub mod registry;

pub use error::OrchestratorError;
pub use executor::{
    ExecutionReport, ForceResyncReport, Recovery, SharedExcludes, SyncExecutor, SyncOutcome,
};
pub use orchestrator::{OrchestratorSettings, OrchestratorStatus, SyncOrchestrator};
pub use registry::{DirectoryRegistry, RegisterOutcome};
