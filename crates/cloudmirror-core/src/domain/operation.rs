//! Pending sync requests

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A queued request to synchronize one directory
///
/// `sequence` is a monotonically increasing stamp handed out by the queue;
/// ordering by it is ordering by enqueue time, without ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    directory: PathBuf,
    enqueued_at: DateTime<Utc>,
    sequence: u64,
    retry_count: u32,
}

impl SyncOperation {
    pub fn new(directory: PathBuf, sequence: u64, retry_count: u32) -> Self {
        Self {
            directory,
            enqueued_at: Utc::now(),
            sequence,
            retry_count,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Consecutive failed runs of the directory when this entry was queued
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Moves the entry to the back of the line without duplicating it
    pub fn refresh(&mut self, sequence: u64, retry_count: u32) {
        self.enqueued_at = Utc::now();
        self.sequence = sequence;
        self.retry_count = retry_count;
    }
}
