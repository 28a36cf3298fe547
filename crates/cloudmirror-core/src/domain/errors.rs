//! Domain error types
//!
//! Errors raised while validating operator input against the domain:
//! directory paths, remote identifiers and exclude patterns.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The local path does not exist or is not a directory
    #[error("Invalid directory {path}: {reason}")]
    InvalidDirectory {
        /// The path as given by the caller
        path: PathBuf,
        /// Why the path was rejected
        reason: String,
    },

    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// The exclude pattern is not a valid glob
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// The exclude pattern is already part of the rule set
    #[error("Exclude pattern already present: {0}")]
    DuplicatePattern(String),

    /// The exclude pattern is not part of the rule set
    #[error("Unknown exclude pattern: {0}")]
    UnknownPattern(String),
}
