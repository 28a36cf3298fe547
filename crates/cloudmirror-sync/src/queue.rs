//! Deduplicating sync queue
//!
//! Holds at most one pending [`SyncOperation`] per directory. Re-enqueueing
//! a queued directory moves it to the back of the line instead of adding a
//! second entry, so a burst of triggers collapses into one run.
//!
//! ## Lock order
//!
//! [`take_oldest_with`](SyncQueue::take_oldest_with) calls its selector with
//! the queue lock held. Selectors may take the registry lock; nothing may
//! take them the other way round.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use tracing::debug;

use cloudmirror_core::domain::SyncOperation;

/// Result of [`SyncQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// A new entry was added
    Queued,
    /// An existing entry was moved to the back
    Refreshed,
    /// The queue is closed; nothing was added
    Closed,
}

#[derive(Debug, Default)]
struct Pending {
    entries: HashMap<PathBuf, SyncOperation>,
    next_sequence: u64,
}

/// Pending sync requests in enqueue order, one per directory
#[derive(Debug)]
pub struct SyncQueue {
    pending: Mutex<Pending>,
    accepting: AtomicBool,
}

impl Default for SyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncQueue {
    /// Creates an open, empty queue
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            accepting: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or refreshes the entry for `directory`
    ///
    /// `retry_count` is recorded for observability only.
    pub fn enqueue(&self, directory: &Path, retry_count: u32) -> EnqueueResult {
        if !self.accepting.load(Ordering::Acquire) {
            return EnqueueResult::Closed;
        }

        let mut pending = self.lock();
        pending.next_sequence += 1;
        let sequence = pending.next_sequence;

        match pending.entries.get_mut(directory) {
            Some(op) => {
                op.refresh(sequence, retry_count);
                debug!(path = %directory.display(), sequence, "Refreshed queued sync");
                EnqueueResult::Refreshed
            }
            None => {
                pending.entries.insert(
                    directory.to_path_buf(),
                    SyncOperation::new(directory.to_path_buf(), sequence, retry_count),
                );
                debug!(path = %directory.display(), sequence, "Queued sync");
                EnqueueResult::Queued
            }
        }
    }

    /// Removes and returns the oldest entry accepted by `select`
    ///
    /// Entries are offered oldest first; the first one for which `select`
    /// returns `Some` is removed. Rejected entries keep their position.
    pub fn take_oldest_with<T, F>(&self, mut select: F) -> Option<(SyncOperation, T)>
    where
        F: FnMut(&SyncOperation) -> Option<T>,
    {
        let mut pending = self.lock();

        let mut ordered: Vec<&SyncOperation> = pending.entries.values().collect();
        ordered.sort_by_key(|op| op.sequence());

        let (key, value) = ordered
            .into_iter()
            .find_map(|op| select(op).map(|v| (op.directory().to_path_buf(), v)))?;

        let op = pending.entries.remove(&key)?;
        Some((op, value))
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, directory: &Path) -> bool {
        self.lock().entries.contains_key(directory)
    }

    /// Queued directories, oldest first
    pub fn pending(&self) -> Vec<PathBuf> {
        let pending = self.lock();
        let mut ops: Vec<&SyncOperation> = pending.entries.values().collect();
        ops.sort_by_key(|op| op.sequence());
        ops.into_iter().map(|op| op.directory().to_path_buf()).collect()
    }

    /// Stops accepting new entries
    pub fn close(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Accepts new entries again
    pub fn reopen(&self) {
        self.accepting.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Drops every pending entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        let removed = pending.entries.len();
        pending.entries.clear();
        removed
    }
}
