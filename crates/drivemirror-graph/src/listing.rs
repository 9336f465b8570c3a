//! Paged enumeration of folder children
//!
//! `GET /drives/{drive}/items/{folder}/children?$top=N`, following
//! `@odata.nextLink` until the last page. Items are classified by the
//! `folder` and `file` facets; entries with neither (OneNote packages and the
//! like) are kept as [`ItemKind::Other`].

use drivemirror_core::domain::{DriveId, ItemId, ItemKind, MirrorError, RemoteItem};
use drivemirror_core::ports::ChildMap;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::GraphClient;

// ============================================================================
// Graph API response types
// ============================================================================

/// One page of a children listing
#[derive(Debug, Deserialize)]
pub(crate) struct GraphChildrenPage {
    #[serde(default)]
    pub value: Vec<GraphDriveItem>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Minimal DriveItem as returned by listings and item lookups
#[derive(Debug, Deserialize)]
pub(crate) struct GraphDriveItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Folder facet (present if item is a folder)
    pub folder: Option<serde_json::Value>,
    /// File facet (present if item is a file)
    pub file: Option<serde_json::Value>,
}

impl GraphDriveItem {
    pub fn kind(&self) -> ItemKind {
        if self.folder.is_some() {
            ItemKind::Folder
        } else if self.file.is_some() {
            ItemKind::File
        } else {
            ItemKind::Other
        }
    }

    pub fn into_remote_item(self) -> Result<RemoteItem, MirrorError> {
        let kind = self.kind();
        let id = ItemId::new(self.id)
            .map_err(|e| MirrorError::InvalidResponse(format!("item id: {e}")))?;
        Ok(RemoteItem::new(id, self.name, kind))
    }
}

/// Path of the first children page of a folder
pub(crate) fn children_path(drive: &DriveId, folder: &ItemId) -> String {
    format!("/drives/{}/items/{}/children", drive, folder)
}

// ============================================================================
// list_children
// ============================================================================

/// Lists the direct children of `folder`, keyed by name
///
/// Duplicate names across pages resolve to the last entry seen.
///
/// # Errors
///
/// - [`MirrorError::ListingFailure`] if a page returns a non-200 status, cannot
///   be parsed, or the executor gave up on it
/// - [`MirrorError::AuthFailure`] if no token can be obtained
#[tracing::instrument(skip(client))]
pub async fn list_children(
    client: &GraphClient,
    drive: &DriveId,
    folder: &ItemId,
) -> Result<ChildMap, MirrorError> {
    let mut next = Some(format!(
        "{}?$top={}",
        children_path(drive, folder),
        client.page_size()
    ));
    let mut children = ChildMap::new();
    let mut page_count: u32 = 0;

    while let Some(link) = next.take() {
        page_count += 1;

        let response = client
            .execute_with_retry(Method::GET, &link, None)
            .await
            .map_err(|e| match MirrorError::from(e) {
                fatal @ MirrorError::AuthFailure(_) => fatal,
                other => MirrorError::ListingFailure(other.to_string()),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(page = page_count, status = status.as_u16(), "Listing page rejected");
            return Err(MirrorError::ListingFailure(format!(
                "status {} for {}: {}",
                status.as_u16(),
                link,
                body
            )));
        }

        let page: GraphChildrenPage = response
            .json()
            .await
            .map_err(|e| MirrorError::ListingFailure(format!("unreadable page: {e}")))?;

        debug!(
            page = page_count,
            items = page.value.len(),
            has_next = page.next_link.is_some(),
            "Received children page"
        );

        for item in page.value {
            match item.into_remote_item() {
                Ok(item) => {
                    children.insert(item.name.clone(), item);
                }
                Err(e) => warn!(page = page_count, error = %e, "Skipping malformed entry"),
            }
        }
        next = page.next_link;
    }

    debug!(total = children.len(), pages = page_count, "Listing complete");
    Ok(children)
}
