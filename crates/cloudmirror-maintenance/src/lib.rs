//! CloudMirror Maintenance - sequenced OS maintenance commands
//!
//! Runs a fixed list of commands (package index refresh, upgrades, flatpak
//! updates, ...) one after another through a
//! [`CommandRunner`](cloudmirror_process::CommandRunner).
//!
//! ## Sequencing contract
//!
//! - Steps run strictly in order, never concurrently.
//! - A failing optional step is recorded and the sequence continues.
//! - A failing required step is recorded, every remaining step is marked
//!   skipped, and the run is reported as aborted.
//! - Only one run is in progress at a time.
//!
//! What the steps actually do is configuration, not code.

pub mod sequencer;

pub use sequencer::{
    MaintenanceError, MaintenanceReport, MaintenanceSequencer, MaintenanceStep, StepResult,
    StepStatus,
};
