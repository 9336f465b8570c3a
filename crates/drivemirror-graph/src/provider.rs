//! GraphRemoteStorage - IRemoteStorage implementation for Microsoft Graph API
//!
//! Wraps the [`GraphClient`] and delegates to the listing, folders and copy
//! modules to fulfil the [`IRemoteStorage`] port contract.
//!
//! ## Design Notes
//!
//! - `GraphClient` only needs `&self`, so the provider shares it without a
//!   lock and concurrent workers issue requests in parallel.
//! - Drive and path resolution (see [`crate::drive`]) are setup steps run by
//!   the CLI before traversal and are not part of the port.

use std::sync::Arc;

use drivemirror_core::domain::{CopyRequest, DriveId, FolderResolution, ItemId, MirrorError};
use drivemirror_core::ports::{ChildMap, IRemoteStorage};
use tracing::debug;

use crate::client::GraphClient;
use crate::{copy, folders, listing};

/// Microsoft Graph backed [`IRemoteStorage`]
pub struct GraphRemoteStorage {
    client: Arc<GraphClient>,
}

impl GraphRemoteStorage {
    /// Creates a new `GraphRemoteStorage` sharing the given [`GraphClient`]
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<GraphClient> {
        &self.client
    }
}

#[async_trait::async_trait]
impl IRemoteStorage for GraphRemoteStorage {
    /// Delegates to [`listing::list_children`], which follows pagination.
    async fn list_children(
        &self,
        drive: &DriveId,
        folder: &ItemId,
    ) -> Result<ChildMap, MirrorError> {
        debug!(%drive, %folder, "GraphRemoteStorage::list_children");
        listing::list_children(&self.client, drive, folder).await
    }

    /// Delegates to [`folders::ensure_folder`].
    async fn ensure_folder(
        &self,
        drive: &DriveId,
        parent: &ItemId,
        name: &str,
    ) -> Result<FolderResolution, MirrorError> {
        debug!(%drive, %parent, name, "GraphRemoteStorage::ensure_folder");
        folders::ensure_folder(&self.client, drive, parent, name).await
    }

    /// Delegates to [`copy::submit_copy`].
    async fn copy_item(&self, request: &CopyRequest) -> Result<(), MirrorError> {
        debug!(file = %request.desired_name, "GraphRemoteStorage::copy_item");
        copy::submit_copy(&self.client, request).await
    }
}
