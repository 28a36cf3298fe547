//! Integration tests for cloudmirror-sync
//!
//! Uses a scripted stand-in for rclone to verify the executor's recovery
//! paths and the orchestrator's queueing, exclusivity and lifecycle
//! behavior on a paused tokio clock.

mod common;

mod test_executor;
mod test_orchestrator;
