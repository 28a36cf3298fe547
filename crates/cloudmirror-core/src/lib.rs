//! CloudMirror Core - Domain types and configuration
//!
//! This crate holds everything the other CloudMirror crates agree on:
//! - **Domain entities** - `SyncDirectory`, `SyncStatus`, `SyncOperation`, `ExcludeRules`
//! - **Configuration** - the YAML configuration file, defaults and validation
//!
//! It has no async runtime dependency; the orchestrator, the subprocess
//! runner and the daemon build on top of it.

pub mod config;
pub mod domain;
