//! Run-wide counters
//!
//! [`RunStatistics`] is shared by reference (`Arc`) with every worker of a
//! run. Counters only ever increase and are read once, through
//! [`RunStatistics::snapshot`], for the final report.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe monotonic counters for one replication run
#[derive(Debug, Default)]
pub struct RunStatistics {
    copied: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    folders_created: AtomicU64,
    incomplete_directories: AtomicU64,
    abandoned_subtrees: AtomicU64,
}

/// Point-in-time copy of [`RunStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Copy submissions accepted by the API
    pub copied: u64,
    /// Copy submissions rejected or failed in transport
    pub failed: u64,
    /// Files found still missing on a round after the first
    pub retried: u64,
    /// Target folders created by this run
    pub folders_created: u64,
    /// Directories that did not converge within the round budget
    pub incomplete_directories: u64,
    /// Subtrees skipped because their target folder could not be resolved
    pub abandoned_subtrees: u64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_copied(&self) {
        self.copied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds the number of files that had to be resubmitted
    pub fn record_retried(&self, count: u64) {
        self.retried.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_folder_created(&self) {
        self.folders_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incomplete_directory(&self) {
        self.incomplete_directories.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned_subtree(&self) {
        self.abandoned_subtrees.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            copied: self.copied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            folders_created: self.folders_created.load(Ordering::Relaxed),
            incomplete_directories: self.incomplete_directories.load(Ordering::Relaxed),
            abandoned_subtrees: self.abandoned_subtrees.load(Ordering::Relaxed),
        }
    }
}
