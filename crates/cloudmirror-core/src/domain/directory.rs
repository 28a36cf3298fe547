//! Synchronized directory pairs and their runtime status
//!
//! A [`SyncDirectory`] is one `(local, remote)` pair mirrored by the
//! orchestrator. Its path fields never change after construction; the only
//! mutable bit is `needs_initial_sync`, which selects a full state rebuild on
//! the next run of the external tool.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// SyncDirectory
// ============================================================================

/// A configured local directory and the remote it mirrors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDirectory {
    local_path: PathBuf,
    remote_path: String,
    needs_initial_sync: bool,
}

impl SyncDirectory {
    /// Builds a pair from an already canonical local path
    ///
    /// New pairs always start with `needs_initial_sync = true`.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidRemotePath`] for an empty remote or one
    /// containing control characters, and [`DomainError::InvalidDirectory`]
    /// for a relative local path.
    pub fn new(local_path: PathBuf, remote_path: impl Into<String>) -> Result<Self, DomainError> {
        let remote_path = remote_path.into();
        validate_remote(&remote_path)?;

        if !local_path.is_absolute() {
            return Err(DomainError::InvalidDirectory {
                path: local_path,
                reason: "path must be absolute".to_string(),
            });
        }

        Ok(Self {
            local_path,
            remote_path,
            needs_initial_sync: true,
        })
    }

    /// Canonicalizes `local_path` on disk, then builds the pair
    ///
    /// # Errors
    /// Fails when the path does not exist or is not a directory.
    pub fn from_filesystem(
        local_path: &Path,
        remote_path: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let canonical = canonicalize_directory(local_path)?;
        Self::new(canonical, remote_path)
    }

    /// Canonical local path
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Remote identifier passed verbatim to the sync tool
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Whether the next run must rebuild the tool's state from scratch
    pub fn needs_initial_sync(&self) -> bool {
        self.needs_initial_sync
    }

    /// Marks the pair as needing (or not) a full state rebuild
    pub fn set_needs_initial_sync(&mut self, value: bool) {
        self.needs_initial_sync = value;
    }

    /// Whether `other` names the same pair (ignoring runtime flags)
    pub fn same_pair(&self, other: &SyncDirectory) -> bool {
        self.local_path == other.local_path && self.remote_path == other.remote_path
    }
}

impl Display for SyncDirectory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local_path.display(), self.remote_path)
    }
}

fn validate_remote(remote: &str) -> Result<(), DomainError> {
    if remote.trim().is_empty() {
        return Err(DomainError::InvalidRemotePath(
            "remote path must not be empty".to_string(),
        ));
    }
    if remote.chars().any(char::is_control) {
        return Err(DomainError::InvalidRemotePath(format!(
            "remote path contains control characters: {remote:?}"
        )));
    }
    if remote != remote.trim() {
        return Err(DomainError::InvalidRemotePath(format!(
            "remote path has leading or trailing whitespace: {remote:?}"
        )));
    }
    Ok(())
}

/// Resolves `path` to its canonical form and checks that it is a directory
pub fn canonicalize_directory(path: &Path) -> Result<PathBuf, DomainError> {
    let canonical = std::fs::canonicalize(path).map_err(|e| DomainError::InvalidDirectory {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !canonical.is_dir() {
        return Err(DomainError::InvalidDirectory {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    Ok(canonical)
}

// ============================================================================
// SyncStatus
// ============================================================================

/// Runtime state of a directory
///
/// `Syncing` doubles as the exclusivity gate: a directory in this state is
/// never handed to a second executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Waiting for the next trigger
    #[default]
    Idle,
    /// An executor currently owns the directory
    Syncing,
    /// The last run ended in an unrecovered failure
    Error,
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// DirectoryState - read-only snapshot for status reporting
// ============================================================================

/// Point-in-time view of one registered directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryState {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub status: SyncStatus,
    pub needs_initial_sync: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}
