//! Conflict-safe folder get-or-create
//!
//! Creation is attempted with `conflictBehavior = fail`, so the service
//! arbitrates concurrent creators: exactly one receives `201 Created`, every
//! other caller gets `409 Conflict` and looks the folder up by name.

use drivemirror_core::domain::{DriveId, FolderResolution, ItemId, MirrorError};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::GraphClient;
use crate::listing::children_path;

#[derive(Debug, Deserialize)]
struct CreatedItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FilterResult {
    #[serde(default)]
    value: Vec<CreatedItem>,
}

/// Quotes a value for an OData string literal
fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn resolution_error(name: &str, reason: impl Into<String>) -> MirrorError {
    MirrorError::FolderResolution {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Maps executor failures; credential failures stay fatal
fn request_error(name: &str, err: crate::GraphError) -> MirrorError {
    match MirrorError::from(err) {
        fatal @ MirrorError::AuthFailure(_) => fatal,
        other => resolution_error(name, other.to_string()),
    }
}

fn parse_item_id(name: &str, raw: String) -> Result<ItemId, MirrorError> {
    ItemId::new(raw).map_err(|e| resolution_error(name, format!("invalid id in response: {e}")))
}

/// Gets or creates the child folder `name` under `parent`
///
/// # Errors
///
/// [`MirrorError::FolderResolution`] when the create is rejected with a status
/// other than 201/409, or a 409 is followed by a lookup that finds nothing.
#[tracing::instrument(skip(client))]
pub async fn ensure_folder(
    client: &GraphClient,
    drive: &DriveId,
    parent: &ItemId,
    name: &str,
) -> Result<FolderResolution, MirrorError> {
    let body = json!({
        "name": name,
        "folder": {},
        "@microsoft.graph.conflictBehavior": "fail",
    });

    let response = client
        .execute_with_retry(Method::POST, &children_path(drive, parent), Some(&body))
        .await
        .map_err(|e| request_error(name, e))?;

    match response.status() {
        StatusCode::CREATED => {
            let created: CreatedItem = response
                .json()
                .await
                .map_err(|e| resolution_error(name, format!("unreadable create response: {e}")))?;
            info!(folder = name, "Created folder");
            Ok(FolderResolution {
                id: parse_item_id(name, created.id)?,
                was_created: true,
            })
        }
        StatusCode::CONFLICT => {
            debug!(folder = name, "Folder already exists, looking it up");
            let id = find_child_by_name(client, drive, parent, name).await?;
            Ok(FolderResolution {
                id,
                was_created: false,
            })
        }
        status => {
            let detail = response.text().await.unwrap_or_default();
            warn!(folder = name, status = status.as_u16(), %detail, "Folder creation rejected");
            Err(resolution_error(
                name,
                format!("create returned status {}: {}", status.as_u16(), detail),
            ))
        }
    }
}

/// Looks up a child by exact name after a 409; the first match wins
async fn find_child_by_name(
    client: &GraphClient,
    drive: &DriveId,
    parent: &ItemId,
    name: &str,
) -> Result<ItemId, MirrorError> {
    let mut url = client
        .segments_url(["drives", drive.as_str(), "items", parent.as_str(), "children"])
        .map_err(|e| request_error(name, e))?;
    url.query_pairs_mut()
        .append_pair("$filter", &format!("name eq {}", odata_literal(name)));

    let response = client
        .execute_with_retry(Method::GET, url.as_str(), None)
        .await
        .map_err(|e| request_error(name, e))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(resolution_error(
            name,
            format!("lookup after conflict returned status {}", status.as_u16()),
        ));
    }

    let result: FilterResult = response
        .json()
        .await
        .map_err(|e| resolution_error(name, format!("unreadable lookup response: {e}")))?;

    match result.value.into_iter().next() {
        Some(item) => parse_item_id(name, item.id),
        None => {
            warn!(folder = name, "Conflict reported but folder not found by name");
            Err(resolution_error(name, "conflict reported but folder not found"))
        }
    }
}
