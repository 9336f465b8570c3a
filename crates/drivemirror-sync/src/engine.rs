//! Replication engine
//!
//! The [`MirrorEngine`] mirrors a source folder tree into a target folder
//! through an [`IRemoteStorage`] port.
//!
//! ## Run Flow
//!
//! 1. **Reconcile**: bring one directory's file set in line with its source
//!    (see [`crate::reconcile`])
//! 2. **Resolve**: get-or-create the target counterpart of each source subfolder
//! 3. **Descend**: reconcile that subfolder before moving on to its siblings
//!
//! Traversal runs over an explicit LIFO work list so deep trees do not grow
//! the call stack. Entries are pushed in reverse, which keeps the order of
//! resolution and descent identical to a recursive depth-first walk.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drivemirror_core::config::MirrorConfig;
use drivemirror_core::domain::{
    DirectoryMirrorTask, LogicalPath, MirrorError, RemoteItem, RunStatistics,
};
use drivemirror_core::ports::IRemoteStorage;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::reconcile::DirectoryOutcome;
use crate::report::MirrorReport;

// ============================================================================
// MirrorOptions
// ============================================================================

/// Tuning knobs of the reconciliation loop
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Concurrent copy submissions within one directory round
    pub max_workers: usize,
    /// Listing/diff/copy rounds per directory
    pub max_rounds: u32,
    /// Wait after the first copy round
    pub propagation_base: Duration,
    /// Extra wait added per round index
    pub propagation_step: Duration,
    /// Wait after a failed listing
    pub listing_retry_delay: Duration,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self::from_config(&MirrorConfig::default())
    }
}

impl MirrorOptions {
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            max_rounds: config.max_rounds.max(1),
            propagation_base: Duration::from_secs(config.propagation_base_secs),
            propagation_step: Duration::from_secs(config.propagation_step_secs),
            listing_retry_delay: Duration::from_secs(config.listing_retry_secs),
        }
    }

    /// Wait after copy round `attempt` (0-based): base + attempt * step
    pub fn propagation_wait(&self, attempt: u32) -> Duration {
        self.propagation_base + self.propagation_step.saturating_mul(attempt)
    }
}

// ============================================================================
// Work list
// ============================================================================

/// One pending step of the depth-first traversal
#[derive(Debug)]
enum WorkItem {
    /// Reconcile this directory pair, then schedule its subfolders
    Mirror(DirectoryMirrorTask),
    /// Resolve the target counterpart of `folder` under `parent`, then mirror it
    Resolve {
        parent: Arc<DirectoryMirrorTask>,
        folder: RemoteItem,
    },
}

// ============================================================================
// MirrorEngine
// ============================================================================

/// Reconciling tree replication engine
///
/// ## Dependencies
///
/// - `storage`: remote listing, folder get-or-create and copy submission
/// - `stats`: run-wide counters shared with the caller for reporting
/// - `cancel`: stops new submissions; in-flight ones are allowed to finish
pub struct MirrorEngine {
    pub(crate) storage: Arc<dyn IRemoteStorage>,
    pub(crate) options: MirrorOptions,
    pub(crate) stats: Arc<RunStatistics>,
    pub(crate) cancel: CancellationToken,
}

impl MirrorEngine {
    pub fn new(
        storage: Arc<dyn IRemoteStorage>,
        options: MirrorOptions,
        stats: Arc<RunStatistics>,
    ) -> Self {
        Self {
            storage,
            options,
            stats,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to stop the run early
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    pub fn stats(&self) -> &Arc<RunStatistics> {
        &self.stats
    }

    /// Sleeps for `duration` unless cancelled first; returns false on cancellation
    pub(crate) async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Mirrors the tree rooted at `root`
    ///
    /// Per-directory faults are recorded in the report and never abort the
    /// run.
    ///
    /// # Errors
    ///
    /// Only [`MirrorError::AuthFailure`] is returned; it aborts the traversal.
    #[tracing::instrument(skip(self, root), fields(path = %root.logical_path))]
    pub async fn run(&self, root: DirectoryMirrorTask) -> Result<MirrorReport, MirrorError> {
        let started_at = Utc::now();
        let clock = tokio::time::Instant::now();
        let mut report = MirrorReport::new(Uuid::new_v4(), started_at);

        info!(
            run_id = %report.run_id,
            max_workers = self.options.max_workers,
            max_rounds = self.options.max_rounds,
            "Starting mirror run"
        );

        let mut work = vec![WorkItem::Mirror(root)];

        while let Some(item) = work.pop() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match item {
                WorkItem::Mirror(task) => {
                    let reconciliation = self.reconcile_directory(&task).await?;
                    let path = task.logical_path.clone();

                    match reconciliation.outcome {
                        DirectoryOutcome::Converged { .. } => report.converged.push(path),
                        DirectoryOutcome::Exhausted { .. } => report.exhausted.push(path),
                        DirectoryOutcome::Unlisted => report.unlisted.push(path),
                        DirectoryOutcome::Cancelled => {
                            report.cancelled = true;
                            break;
                        }
                    }

                    let parent = Arc::new(task);
                    for folder in reconciliation.subfolders.into_iter().rev() {
                        work.push(WorkItem::Resolve {
                            parent: Arc::clone(&parent),
                            folder,
                        });
                    }
                }
                WorkItem::Resolve { parent, folder } => {
                    if let Some(child) = self.resolve_child(&parent, folder, &mut report).await? {
                        work.push(WorkItem::Mirror(child));
                    }
                }
            }
        }

        report.stats = self.stats.snapshot();
        report.duration = clock.elapsed();

        info!(
            run_id = %report.run_id,
            cancelled = report.cancelled,
            copied = report.stats.copied,
            failed = report.stats.failed,
            incomplete = report.exhausted.len() + report.unlisted.len(),
            abandoned = report.abandoned.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "Mirror run finished"
        );
        Ok(report)
    }

    /// Resolves the target folder for one source subfolder
    ///
    /// Returns `None` when the subtree has to be abandoned.
    async fn resolve_child(
        &self,
        parent: &DirectoryMirrorTask,
        folder: RemoteItem,
        report: &mut MirrorReport,
    ) -> Result<Option<DirectoryMirrorTask>, MirrorError> {
        let path = match parent.logical_path.join(&folder.name) {
            Ok(path) => path,
            Err(e) => {
                error!(parent = %parent.logical_path, folder = %folder.name, error = %e, "Unusable folder name, skipping subtree");
                self.stats.record_abandoned_subtree();
                report
                    .abandoned
                    .push(raw_child_path(&parent.logical_path, &folder.name));
                return Ok(None);
            }
        };

        match self
            .storage
            .ensure_folder(&parent.target_drive, &parent.target_folder, &folder.name)
            .await
        {
            Ok(resolution) => {
                if resolution.was_created {
                    self.stats.record_folder_created();
                    info!(path = %path, "Created target folder");
                }
                Ok(Some(parent.child(folder.id, resolution.id, path)))
            }
            Err(e) if e.is_fatal() => {
                error!(path = %path, error = %e, "Authentication failed, aborting run");
                Err(e)
            }
            Err(e) => {
                error!(path = %path, error = %e, "Could not resolve target folder, abandoning subtree");
                self.stats.record_abandoned_subtree();
                report.abandoned.push(path.to_string());
                Ok(None)
            }
        }
    }
}

/// Display form of `parent`/`name` for a name [`LogicalPath::join`] refuses
fn raw_child_path(parent: &LogicalPath, name: &str) -> String {
    if parent.is_root() {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
