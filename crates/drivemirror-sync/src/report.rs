//! Final run report

use std::time::Duration;

use chrono::{DateTime, Utc};
use drivemirror_core::domain::{LogicalPath, StatsSnapshot};
use serde::{Serialize, Serializer};
use uuid::Uuid;

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Outcome of one mirror run
///
/// Every reconciled directory lands in exactly one of `converged`,
/// `exhausted` or `unlisted`. Subtrees whose target folder could not be
/// resolved are listed in `abandoned` and never reconciled. Those entries are
/// plain strings because a folder with an unusable name has no valid
/// [`LogicalPath`].
#[derive(Debug, Clone, Serialize)]
pub struct MirrorReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub converged: Vec<LogicalPath>,
    pub exhausted: Vec<LogicalPath>,
    pub unlisted: Vec<LogicalPath>,
    pub abandoned: Vec<String>,
    pub cancelled: bool,
    pub stats: StatsSnapshot,
}

impl MirrorReport {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            duration: Duration::ZERO,
            converged: Vec::new(),
            exhausted: Vec::new(),
            unlisted: Vec::new(),
            abandoned: Vec::new(),
            cancelled: false,
            stats: StatsSnapshot::default(),
        }
    }

    /// Directories that were visited but did not end up complete
    pub fn incomplete(&self) -> impl Iterator<Item = &LogicalPath> {
        self.exhausted.iter().chain(self.unlisted.iter())
    }

    /// True when every visited directory converged and nothing was skipped
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.exhausted.is_empty()
            && self.unlisted.is_empty()
            && self.abandoned.is_empty()
    }
}
