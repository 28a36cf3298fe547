//! Lock and listing-cache cleanup for bisync sessions
//!
//! rclone names its per-pair files after a session name derived from both
//! paths. The janitor reproduces that derivation to find and delete them.

use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use cloudmirror_core::domain::SyncDirectory;

/// Removes bisync lock and listing files for a directory pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BisyncJanitor {
    work_dir: PathBuf,
}

impl BisyncJanitor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Session name: each side trimmed of `/` and `\` at both ends, with
    /// whitespace, `/`, `\`, `:`, `?` and `*` replaced by `_`, joined with `..`
    pub fn session_name(local: &Path, remote: &str) -> String {
        fn sanitize(side: &str) -> String {
            side.trim_matches(|c| c == '/' || c == '\\')
                .chars()
                .map(|c| match c {
                    '/' | '\\' | ':' | '?' | '*' => '_',
                    c if c.is_whitespace() => '_',
                    other => other,
                })
                .collect()
        }
        format!(
            "{}..{}",
            sanitize(&local.to_string_lossy()),
            sanitize(remote)
        )
    }

    pub fn lock_path(&self, directory: &SyncDirectory) -> PathBuf {
        let session = Self::session_name(directory.local_path(), directory.remote_path());
        self.work_dir.join(format!("{session}.lck"))
    }

    /// Deletes the lock file; returns whether one existed
    pub async fn clear_lock(&self, directory: &SyncDirectory) -> io::Result<bool> {
        let lock = self.lock_path(directory);
        match tokio::fs::remove_file(&lock).await {
            Ok(()) => {
                info!(lock = %lock.display(), "Removed bisync lock file");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(lock = %lock.display(), "No bisync lock file to remove");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes every listing/cache file of the session except the lock
    ///
    /// Returns the number of files removed. A missing working directory
    /// counts as nothing to remove.
    pub async fn clear_cache(&self, directory: &SyncDirectory) -> io::Result<usize> {
        let session = Self::session_name(directory.local_path(), directory.remote_path());
        let prefix = format!("{session}.");
        let lock_name = format!("{session}.lck");

        let mut entries = match tokio::fs::read_dir(&self.work_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || name == lock_name.as_str() {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!(file = %name, "Removed bisync cache file");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        info!(path = %directory.local_path().display(), removed, "Cleared bisync cache");
        Ok(removed)
    }
}
