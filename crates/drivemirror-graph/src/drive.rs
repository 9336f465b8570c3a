//! Drive lookup and path resolution
//!
//! Used once per run, before traversal starts, to turn the configured
//! source and target endpoints into concrete drive and folder ids.

use drivemirror_core::domain::{DriveId, ItemId, LogicalPath, MirrorError, RequestFailureKind};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::client::GraphClient;
use crate::folders::ensure_folder;

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

fn unexpected(status: StatusCode, what: &str) -> MirrorError {
    MirrorError::RequestFailure {
        kind: RequestFailureKind::UnexpectedStatus(status.as_u16()),
        message: what.to_string(),
    }
}

async fn read_id(response: reqwest::Response, what: &str) -> Result<String, MirrorError> {
    let body: IdOnly = response
        .json()
        .await
        .map_err(|e| MirrorError::InvalidResponse(format!("{what}: {e}")))?;
    Ok(body.id)
}

/// Default drive of a user (`GET /users/{user}/drive`)
pub async fn resolve_user_drive(client: &GraphClient, user: &str) -> Result<DriveId, MirrorError> {
    let url = client
        .segments_url(["users", user, "drive"])
        .map_err(MirrorError::from)?;
    let response = client
        .execute_with_retry(Method::GET, url.as_str(), None)
        .await
        .map_err(MirrorError::from)?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(unexpected(status, &format!("drive lookup for user {user}")));
    }

    let id = read_id(response, "drive lookup").await?;
    let drive = DriveId::new(id).map_err(|e| MirrorError::InvalidResponse(e.to_string()))?;
    info!(user, %drive, "Resolved user drive");
    Ok(drive)
}

/// Picks the explicit drive id if given, otherwise the user's default drive
pub async fn resolve_drive(
    client: &GraphClient,
    drive_id: Option<&str>,
    user: Option<&str>,
) -> Result<DriveId, MirrorError> {
    match (drive_id.filter(|d| !d.is_empty()), user.filter(|u| !u.is_empty())) {
        (Some(id), _) => DriveId::new(id).map_err(|e| MirrorError::InvalidResponse(e.to_string())),
        (None, Some(user)) => resolve_user_drive(client, user).await,
        (None, None) => Err(MirrorError::InvalidResponse(
            "neither a drive id nor a user was given".into(),
        )),
    }
}

/// Id of the item at `path` in `drive`, or `None` if nothing exists there
///
/// The root path resolves through `GET /drives/{drive}/root`, any other path
/// through `GET /drives/{drive}/root:/{path}`.
pub async fn resolve_path(
    client: &GraphClient,
    drive: &DriveId,
    path: &LogicalPath,
) -> Result<Option<ItemId>, MirrorError> {
    let mut segments = vec!["drives", drive.as_str()];
    if path.is_root() {
        segments.push("root");
    } else {
        segments.push("root:");
        segments.extend(path.segments());
    }

    let url = client.segments_url(segments).map_err(MirrorError::from)?;
    let response = client
        .execute_with_retry(Method::GET, url.as_str(), None)
        .await
        .map_err(MirrorError::from)?;

    match response.status() {
        StatusCode::OK => {
            let id = read_id(response, "path lookup").await?;
            let id = ItemId::new(id).map_err(|e| MirrorError::InvalidResponse(e.to_string()))?;
            debug!(%drive, %path, item = %id, "Resolved path");
            Ok(Some(id))
        }
        StatusCode::NOT_FOUND => {
            debug!(%drive, %path, "Path does not exist");
            Ok(None)
        }
        status => Err(unexpected(status, &format!("path lookup for {path}"))),
    }
}

/// Ensures every segment of `path` exists below `root`, returning the id of
/// the deepest folder
pub async fn ensure_path(
    client: &GraphClient,
    drive: &DriveId,
    root: &ItemId,
    path: &LogicalPath,
) -> Result<ItemId, MirrorError> {
    let mut current = root.clone();
    for segment in path.segments() {
        let resolution = ensure_folder(client, drive, &current, segment).await?;
        current = resolution.id;
    }
    Ok(current)
}
