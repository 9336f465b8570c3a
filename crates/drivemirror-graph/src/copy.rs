//! Asynchronous server-side copy
//!
//! `POST /drives/{source}/items/{id}/copy` returns `202 Accepted` once the
//! service has queued the copy. Completion is not tracked here; the engine
//! verifies it by listing the target later.

use drivemirror_core::domain::{CopyRequest, MirrorError};
use reqwest::{Method, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use crate::client::GraphClient;

/// Submits one copy and reports whether the service accepted it
///
/// # Errors
///
/// [`MirrorError::CopyRejected`] for any status other than 202, or the mapped
/// executor error when the call could not be completed.
pub async fn submit_copy(client: &GraphClient, request: &CopyRequest) -> Result<(), MirrorError> {
    let path = format!(
        "/drives/{}/items/{}/copy",
        request.source_drive, request.source_item
    );
    let body = json!({
        "parentReference": {
            "driveId": request.target_drive.as_str(),
            "id": request.target_folder.as_str(),
        },
        "name": request.desired_name,
    });

    let response = client
        .execute_with_retry(Method::POST, &path, Some(&body))
        .await
        .map_err(MirrorError::from)?;

    let status = response.status();
    if status == StatusCode::ACCEPTED {
        debug!(file = %request.desired_name, "Copy accepted");
        return Ok(());
    }

    let detail = response.text().await.unwrap_or_default();
    warn!(file = %request.desired_name, status = status.as_u16(), %detail, "Copy rejected");
    Err(MirrorError::CopyRejected {
        name: request.desired_name.clone(),
        reason: format!("status {}: {}", status.as_u16(), detail),
    })
}
