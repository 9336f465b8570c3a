//! Per-directory reconciliation
//!
//! One [`DirectoryMirrorTask`] goes through these steps:
//!
//! 1. List the source once; its subfolders are remembered for the traversal
//! 2. For up to `max_rounds` rounds: list the target, diff file names, submit
//!    the missing files concurrently, then wait for the asynchronous copies to
//!    land (`base + attempt * step`)
//! 3. Stop as soon as a diff comes back empty (converged), or report the
//!    directory incomplete once the round budget is spent (exhausted)
//!
//! Existence by name is the completeness signal: a target entry of any kind
//! with a source file's name counts as present. A rejected copy is not retried
//! within its round; the next round's diff finds it still missing.

use futures_util::{stream, StreamExt};
use tracing::{debug, info, warn};

use drivemirror_core::domain::{CopyRequest, DirectoryMirrorTask, MirrorError, RemoteItem};
use drivemirror_core::ports::ChildMap;

use crate::engine::MirrorEngine;

/// Terminal state of one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOutcome {
    /// Every source file is present in the target; `copy_rounds` copy rounds
    /// were needed (0 if nothing was missing)
    Converged { copy_rounds: u32 },
    /// Round budget spent with `missing` files still absent at the last look
    Exhausted { missing: usize },
    /// The source could not be listed; nothing was copied and no
    /// subfolder is known
    Unlisted,
    /// Stopped by cancellation
    Cancelled,
}

/// Result of reconciling one directory
#[derive(Debug, Clone)]
pub struct DirectoryReconciliation {
    pub outcome: DirectoryOutcome,
    /// Source subfolders to descend into, sorted by name
    pub subfolders: Vec<RemoteItem>,
}

impl DirectoryReconciliation {
    fn without_subfolders(outcome: DirectoryOutcome) -> Self {
        Self {
            outcome,
            subfolders: Vec::new(),
        }
    }
}

/// Source files absent from the target listing, by name
fn missing_files<'a>(files: &'a [RemoteItem], target: &ChildMap) -> Vec<&'a RemoteItem> {
    files
        .iter()
        .filter(|file| !target.contains_key(&file.name))
        .collect()
}

impl MirrorEngine {
    /// Runs the reconciliation state machine for one directory pair
    ///
    /// # Errors
    ///
    /// Only [`MirrorError::AuthFailure`]; every other fault ends in a
    /// [`DirectoryOutcome`].
    #[tracing::instrument(skip(self, task), fields(path = %task.logical_path))]
    pub async fn reconcile_directory(
        &self,
        task: &DirectoryMirrorTask,
    ) -> Result<DirectoryReconciliation, MirrorError> {
        let source = match self.list_source(task).await? {
            Some(source) => source,
            None if self.cancel.is_cancelled() => {
                return Ok(DirectoryReconciliation::without_subfolders(
                    DirectoryOutcome::Cancelled,
                ))
            }
            None => {
                self.stats.record_incomplete_directory();
                return Ok(DirectoryReconciliation::without_subfolders(
                    DirectoryOutcome::Unlisted,
                ));
            }
        };

        let total = source.len();
        let mut files = Vec::new();
        let mut subfolders = Vec::new();
        for item in source.into_values() {
            if item.is_file() {
                files.push(item);
            } else if item.is_folder() {
                subfolders.push(item);
            }
        }
        subfolders.sort_by(|a, b| a.name.cmp(&b.name));

        let outcome = self.copy_rounds(task, &files, total).await?;
        Ok(DirectoryReconciliation {
            outcome,
            subfolders,
        })
    }

    /// Lists the source folder, retrying a failed listing up to `max_rounds` times
    async fn list_source(&self, task: &DirectoryMirrorTask) -> Result<Option<ChildMap>, MirrorError> {
        for attempt in 0..self.options.max_rounds {
            match self
                .storage
                .list_children(&task.source_drive, &task.source_folder)
                .await
            {
                Ok(children) => return Ok(Some(children)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(path = %task.logical_path, attempt, error = %e, "Cannot list source directory");
                    if attempt + 1 < self.options.max_rounds
                        && !self.pause(self.options.listing_retry_delay).await
                    {
                        return Ok(None);
                    }
                }
            }
        }
        warn!(path = %task.logical_path, "Source directory unreadable, skipping it");
        Ok(None)
    }

    async fn copy_rounds(
        &self,
        task: &DirectoryMirrorTask,
        files: &[RemoteItem],
        total: usize,
    ) -> Result<DirectoryOutcome, MirrorError> {
        let path = &task.logical_path;
        let mut last_missing = files.len();
        let mut copy_rounds = 0u32;

        for attempt in 0..self.options.max_rounds {
            if self.cancel.is_cancelled() {
                return Ok(DirectoryOutcome::Cancelled);
            }

            let target = match self
                .storage
                .list_children(&task.target_drive, &task.target_folder)
                .await
            {
                Ok(target) => target,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(path = %path, attempt, error = %e, "Cannot list target directory, retrying");
                    if !self.pause(self.options.listing_retry_delay).await {
                        return Ok(DirectoryOutcome::Cancelled);
                    }
                    continue;
                }
            };

            let missing = missing_files(files, &target);
            last_missing = missing.len();

            if missing.is_empty() {
                match copy_rounds {
                    0 => debug!(path = %path, files = files.len(), "Directory already complete"),
                    1 => info!(path = %path, "Directory complete"),
                    _ => info!(path = %path, rounds = copy_rounds, "Directory recovered"),
                }
                return Ok(DirectoryOutcome::Converged { copy_rounds });
            }

            if copy_rounds == 0 {
                info!(path = %path, missing = missing.len(), total, "Processing directory");
            } else {
                self.stats.record_retried(missing.len() as u64);
                info!(path = %path, attempt, missing = missing.len(), "Files still missing, resubmitting");
            }

            self.submit_copies(task, &missing).await?;
            copy_rounds += 1;

            if self.cancel.is_cancelled() {
                return Ok(DirectoryOutcome::Cancelled);
            }
            if !self.pause(self.options.propagation_wait(attempt)).await {
                return Ok(DirectoryOutcome::Cancelled);
            }
        }

        warn!(
            path = %path,
            rounds = self.options.max_rounds,
            missing = last_missing,
            "Directory still incomplete after all rounds"
        );
        self.stats.record_incomplete_directory();
        Ok(DirectoryOutcome::Exhausted {
            missing: last_missing,
        })
    }

    /// Submits one copy per missing file, at most `max_workers` at a time
    ///
    /// Files not yet submitted when cancellation is requested are skipped;
    /// submissions already in flight complete.
    async fn submit_copies(
        &self,
        task: &DirectoryMirrorTask,
        missing: &[&RemoteItem],
    ) -> Result<(), MirrorError> {
        let results: Vec<Option<Result<(), MirrorError>>> = stream::iter(missing.iter())
            .map(|file| {
                let request = CopyRequest {
                    source_drive: task.source_drive.clone(),
                    source_item: file.id.clone(),
                    target_drive: task.target_drive.clone(),
                    target_folder: task.target_folder.clone(),
                    desired_name: file.name.clone(),
                };
                async move {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let result = self.storage.copy_item(&request).await;
                    match &result {
                        Ok(()) => {
                            self.stats.record_copied();
                            debug!(file = %request.desired_name, "Copy submitted");
                        }
                        Err(e) => {
                            self.stats.record_failed();
                            debug!(file = %request.desired_name, error = %e, "Copy submission failed");
                        }
                    }
                    Some(result)
                }
            })
            .buffer_unordered(self.options.max_workers)
            .collect()
            .await;

        match results
            .into_iter()
            .flatten()
            .find_map(|r| r.err().filter(MirrorError::is_fatal))
        {
            Some(fatal) => Err(fatal),
            None => Ok(()),
        }
    }
}
