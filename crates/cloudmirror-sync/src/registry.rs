//! Directory registry - configured pairs and their runtime status
//!
//! The registry is the single owner of per-directory state. Its
//! [`try_begin_sync`](DirectoryRegistry::try_begin_sync) transition is the
//! exclusivity gate: a directory is handed to at most one executor at a time
//! because only the caller that flips it to `syncing` receives it.
//!
//! All methods take `&self`; the map sits behind one short-lived mutex that
//! is never held across an `.await`.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use cloudmirror_core::domain::{
    canonicalize_directory, DirectoryState, DomainError, SyncDirectory, SyncStatus,
};

/// What [`DirectoryRegistry::register`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new directory was added
    Added,
    /// The identical pair was already registered; nothing changed
    Unchanged,
    /// The directory was registered with another remote and has been reset
    Replaced,
}

#[derive(Debug, Clone)]
struct Entry {
    directory: SyncDirectory,
    status: SyncStatus,
    last_sync: Option<DateTime<Utc>>,
    last_error: Option<String>,
    consecutive_failures: u32,
}

impl Entry {
    fn new(directory: SyncDirectory) -> Self {
        Self {
            directory,
            status: SyncStatus::Idle,
            last_sync: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    fn state(&self) -> DirectoryState {
        DirectoryState {
            local_path: self.directory.local_path().to_path_buf(),
            remote_path: self.directory.remote_path().to_string(),
            status: self.status,
            needs_initial_sync: self.directory.needs_initial_sync(),
            last_sync: self.last_sync,
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
        }
    }
}

/// Registered directories keyed by canonical local path
#[derive(Debug, Default)]
pub struct DirectoryRegistry {
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl DirectoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers `local` as mirrored against `remote`
    ///
    /// `local` is canonicalized first. Re-registering the same pair is a
    /// no-op; registering a known directory with a different remote replaces
    /// the entry and starts it over with a full resync.
    ///
    /// # Errors
    /// Returns [`DomainError`] if `local` does not exist, is not a directory,
    /// or `remote` is malformed. The registry is left untouched.
    pub fn register(
        &self,
        local: &Path,
        remote: &str,
    ) -> Result<(SyncDirectory, RegisterOutcome), DomainError> {
        let directory = SyncDirectory::from_filesystem(local, remote)?;
        let key = directory.local_path().to_path_buf();

        let mut entries = self.lock();
        let outcome = match entries.get_mut(&key) {
            Some(existing) if existing.directory.same_pair(&directory) => {
                debug!(path = %key.display(), "Directory already registered");
                return Ok((existing.directory.clone(), RegisterOutcome::Unchanged));
            }
            Some(existing) => {
                info!(
                    path = %key.display(),
                    old_remote = %existing.directory.remote_path(),
                    new_remote = %directory.remote_path(),
                    "Replacing directory registration"
                );
                // An in-flight run keeps its gate; it resolves against the new entry.
                let status = match existing.status {
                    SyncStatus::Syncing => SyncStatus::Syncing,
                    _ => SyncStatus::Idle,
                };
                *existing = Entry::new(directory.clone());
                existing.status = status;
                RegisterOutcome::Replaced
            }
            None => {
                info!(path = %key.display(), remote = %directory.remote_path(), "Registered directory");
                entries.insert(key, Entry::new(directory.clone()));
                RegisterOutcome::Added
            }
        };

        Ok((directory, outcome))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Maps an operator-supplied path to the registry key
    ///
    /// Tries the path as given, then its canonical form.
    pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if self.lock().contains_key(path) {
            return Some(path.to_path_buf());
        }
        let canonical = canonicalize_directory(path).ok()?;
        self.lock().contains_key(&canonical).then_some(canonical)
    }

    pub fn get(&self, path: &Path) -> Option<SyncDirectory> {
        self.lock().get(path).map(|e| e.directory.clone())
    }

    pub fn status_of(&self, path: &Path) -> Option<SyncStatus> {
        self.lock().get(path).map(|e| e.status)
    }

    pub fn state_of(&self, path: &Path) -> Option<DirectoryState> {
        self.lock().get(path).map(Entry::state)
    }

    /// Every registered directory, ordered by local path
    pub fn all_directories(&self) -> Vec<SyncDirectory> {
        let mut all: Vec<SyncDirectory> =
            self.lock().values().map(|e| e.directory.clone()).collect();
        all.sort_by(|a, b| a.local_path().cmp(b.local_path()));
        all
    }

    /// Status view of every directory, ordered by local path
    pub fn snapshot(&self) -> Vec<DirectoryState> {
        let mut states: Vec<DirectoryState> = self.lock().values().map(Entry::state).collect();
        states.sort_by(|a, b| a.local_path.cmp(&b.local_path));
        states
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    /// Flips a directory to `syncing` and hands it out
    ///
    /// Returns `None` if the directory is unknown or already syncing.
    pub fn try_begin_sync(&self, path: &Path) -> Option<SyncDirectory> {
        let mut entries = self.lock();
        let entry = entries.get_mut(path)?;
        if entry.status == SyncStatus::Syncing {
            return None;
        }
        entry.status = SyncStatus::Syncing;
        Some(entry.directory.clone())
    }

    /// Records a successful run of `directory`
    ///
    /// Clears `needs_initial_sync` only if the entry still names the pair
    /// that was synchronized.
    pub fn finish_success(&self, directory: &SyncDirectory, at: DateTime<Utc>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(directory.local_path()) else {
            return;
        };
        entry.status = SyncStatus::Idle;
        if entry.directory.same_pair(directory) {
            entry.directory.set_needs_initial_sync(false);
            entry.last_sync = Some(at);
            entry.last_error = None;
            entry.consecutive_failures = 0;
        }
    }

    /// Records an unrecovered failure; `needs_initial_sync` is left as is
    pub fn finish_failure(&self, directory: &SyncDirectory, error: impl Into<String>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(directory.local_path()) else {
            return;
        };
        if entry.directory.same_pair(directory) {
            entry.status = SyncStatus::Error;
            entry.last_error = Some(error.into());
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        } else {
            entry.status = SyncStatus::Idle;
        }
    }

    /// Forces the next run of `path` to rebuild the tool's state
    pub fn request_full_resync(&self, path: &Path) -> bool {
        match self.lock().get_mut(path) {
            Some(entry) => {
                entry.directory.set_needs_initial_sync(true);
                true
            }
            None => false,
        }
    }

    pub fn consecutive_failures(&self, path: &Path) -> u32 {
        self.lock()
            .get(path)
            .map(|e| e.consecutive_failures)
            .unwrap_or(0)
    }
}
