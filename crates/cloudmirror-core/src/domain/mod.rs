//! Domain entities
//!
//! This module contains the core domain types for CloudMirror:
//! - Synchronized directory pairs and their status
//! - Queued sync operations
//! - The exclude rule set
//! - Domain-specific error types

pub mod directory;
pub mod errors;
pub mod exclude;
pub mod operation;

// Re-export commonly used types
pub use directory::{canonicalize_directory, DirectoryState, SyncDirectory, SyncStatus};
pub use errors::DomainError;
pub use exclude::{ExcludeRules, DEFAULT_EXCLUDES};
pub use operation::SyncOperation;
