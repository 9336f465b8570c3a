//! Remote storage port (driven/secondary port)
//!
//! This module defines everything the replication engine needs from a
//! remote hierarchical storage service. The production implementation
//! targets Microsoft Graph drives; tests use in-memory fakes.
//!
//! ## Design Notes
//!
//! - Errors use the [`MirrorError`] taxonomy; the engine branches on the
//!   variant (fatal auth vs. per-directory faults).
//! - Transient transport failures are expected to be retried inside the
//!   implementation; an `Err` here means the retry budget is spent.
//! - Implementations hold no state the engine relies on between calls. Every
//!   call returns fresh values.

use std::collections::HashMap;

use crate::domain::errors::MirrorError;
use crate::domain::item::RemoteItem;
use crate::domain::newtypes::{DriveId, ItemId};
use crate::domain::task::{CopyRequest, FolderResolution};

/// Direct children of a folder keyed by name
///
/// At most one entry per name; if the service ever reports duplicates, the
/// last one seen wins.
pub type ChildMap = HashMap<String, RemoteItem>;

/// Port trait for remote storage operations used by the replication engine
#[async_trait::async_trait]
pub trait IRemoteStorage: Send + Sync {
    /// Enumerates the direct children of a folder, following pagination
    ///
    /// # Errors
    /// [`MirrorError::ListingFailure`] if any page cannot be fetched;
    /// [`MirrorError::AuthFailure`] if credentials cannot be obtained.
    async fn list_children(&self, drive: &DriveId, folder: &ItemId)
        -> Result<ChildMap, MirrorError>;

    /// Gets or creates a child folder named `name` under `parent`
    ///
    /// When two callers race, both receive the same id and only the one
    /// whose create succeeded sees `was_created = true`.
    ///
    /// # Errors
    /// [`MirrorError::FolderResolution`] if the folder can neither be created
    /// nor found after a name conflict.
    async fn ensure_folder(
        &self,
        drive: &DriveId,
        parent: &ItemId,
        name: &str,
    ) -> Result<FolderResolution, MirrorError>;

    /// Submits an asynchronous copy
    ///
    /// `Ok(())` means the service accepted the request. The copy may become
    /// visible in a listing only later.
    ///
    /// # Errors
    /// [`MirrorError::CopyRejected`] or [`MirrorError::RequestFailure`] when
    /// the submission was not accepted.
    async fn copy_item(&self, request: &CopyRequest) -> Result<(), MirrorError>;
}
