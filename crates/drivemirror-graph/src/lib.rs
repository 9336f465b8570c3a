//! DriveMirror Graph - Microsoft Graph adapter
//!
//! Provides the async client the replication engine talks to:
//! - App-only OAuth2 (client credentials) with a shared, refresh-once token cache
//! - A request executor that absorbs throttling, transient 5xx and network faults
//! - Drive operations: paged child listings, get-or-create folders, async copy
//! - Drive and path resolution used to set up a run
//!
//! ## Modules
//!
//! - [`auth`] - Client-credentials token source and credential cache
//! - [`client`] - Microsoft Graph HTTP client with retry handling
//! - [`rate_limit`] - Optional proactive token bucket and `Retry-After` parsing
//! - [`listing`] - Paged enumeration of folder children
//! - [`folders`] - Conflict-safe folder get-or-create
//! - [`copy`] - Asynchronous server-side copy submission
//! - [`drive`] - Drive lookup and path resolution
//! - [`provider`] - [`IRemoteStorage`](drivemirror_core::ports::IRemoteStorage) implementation

pub mod auth;
pub mod client;
pub mod copy;
pub mod drive;
pub mod folders;
pub mod listing;
pub mod provider;
pub mod rate_limit;

use drivemirror_core::domain::{MirrorError, RequestFailureKind};
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// A token could not be obtained from the identity platform
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The token endpoint was unreachable or returned a server fault
    #[error("Token endpoint unavailable: {0}")]
    TokenUnavailable(String),

    /// The API kept rejecting the token after a forced refresh
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded more often than the throttle budget allows
    #[error("Too many requests after {attempts} throttled attempts: {url}")]
    TooManyRequests {
        /// Number of 429 responses received
        attempts: u32,
        /// Request URL
        url: String,
    },

    /// A server-side error occurred (5xx) on every attempt
    #[error("Server error {status}: {url}")]
    ServerError {
        /// Last status received
        status: u16,
        /// Request URL
        url: String,
    },

    /// A network-level error occurred on every attempt
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// Whether a later attempt of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GraphError::TokenUnavailable(_)
                | GraphError::ServerError { .. }
                | GraphError::NetworkError(_)
        )
    }
}

impl From<GraphError> for MirrorError {
    fn from(err: GraphError) -> Self {
        let message = err.to_string();
        match err {
            GraphError::Auth(reason) => MirrorError::AuthFailure(reason),
            GraphError::TokenUnavailable(_) => MirrorError::RequestFailure {
                kind: RequestFailureKind::TokenUnavailable,
                message,
            },
            GraphError::Unauthorized(_) => MirrorError::RequestFailure {
                kind: RequestFailureKind::Unauthorized,
                message,
            },
            GraphError::TooManyRequests { .. } => MirrorError::RequestFailure {
                kind: RequestFailureKind::Throttled,
                message,
            },
            GraphError::ServerError { status, .. } => MirrorError::RequestFailure {
                kind: RequestFailureKind::ServerError(status),
                message,
            },
            GraphError::NetworkError(_) => MirrorError::RequestFailure {
                kind: RequestFailureKind::Network,
                message,
            },
            GraphError::InvalidResponse(reason) => MirrorError::InvalidResponse(reason),
        }
    }
}
