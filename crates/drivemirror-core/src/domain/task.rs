//! Units of replication work
//!
//! A [`DirectoryMirrorTask`] pairs one source folder with its target
//! counterpart; the engine creates one per folder it descends into and drops
//! it once that directory has been reconciled. A [`CopyRequest`] is a single
//! asynchronous copy submission for one missing file.

use serde::{Deserialize, Serialize};

use super::newtypes::{DriveId, ItemId, LogicalPath};

/// A source/target folder pair to be mirrored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMirrorTask {
    pub source_drive: DriveId,
    pub source_folder: ItemId,
    pub target_drive: DriveId,
    pub target_folder: ItemId,
    /// Path of the source folder, used for logs and the final report
    pub logical_path: LogicalPath,
}

impl DirectoryMirrorTask {
    pub fn new(
        source_drive: DriveId,
        source_folder: ItemId,
        target_drive: DriveId,
        target_folder: ItemId,
        logical_path: LogicalPath,
    ) -> Self {
        Self {
            source_drive,
            source_folder,
            target_drive,
            target_folder,
            logical_path,
        }
    }

    /// Task for a child folder pair, inheriting both drives
    pub fn child(
        &self,
        source_folder: ItemId,
        target_folder: ItemId,
        logical_path: LogicalPath,
    ) -> Self {
        Self {
            source_drive: self.source_drive.clone(),
            source_folder,
            target_drive: self.target_drive.clone(),
            target_folder,
            logical_path,
        }
    }
}

/// One copy submission; the API acknowledges intake, not completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRequest {
    pub source_drive: DriveId,
    pub source_item: ItemId,
    pub target_drive: DriveId,
    pub target_folder: ItemId,
    pub desired_name: String,
}

/// Result of a get-or-create on a named folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderResolution {
    pub id: ItemId,
    /// True only for the caller whose create request made the folder
    pub was_created: bool,
}
