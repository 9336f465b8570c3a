//! Domain error types
//!
//! [`DomainError`] covers validation of domain values. [`MirrorError`] is the
//! taxonomy every [`IRemoteStorage`](crate::ports::IRemoteStorage) operation
//! reports, and the engine decides what is fatal from its variant alone.

use thiserror::Error;

/// Errors that can occur when constructing domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid drive ID
    #[error("Invalid drive ID: {0}")]
    InvalidDriveId(String),

    /// Invalid item ID
    #[error("Invalid item ID: {0}")]
    InvalidItemId(String),

    /// Invalid logical path or path component
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Why a remote call ultimately failed after the executor gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFailureKind {
    /// 5xx on every attempt
    ServerError(u16),
    /// Connection, TLS or timeout failure on every attempt
    Network,
    /// 429 more often than the throttle budget allows
    Throttled,
    /// 401 again after a forced credential refresh
    Unauthorized,
    /// Token endpoint unreachable or failing on every attempt
    TokenUnavailable,
    /// A status the caller did not expect for this operation
    UnexpectedStatus(u16),
}

impl std::fmt::Display for RequestFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerError(status) => write!(f, "server error {status}"),
            Self::Network => write!(f, "network failure"),
            Self::Throttled => write!(f, "throttled"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::TokenUnavailable => write!(f, "token endpoint unavailable"),
            Self::UnexpectedStatus(status) => write!(f, "unexpected status {status}"),
        }
    }
}

/// Errors surfaced by remote storage operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// Credentials cannot be obtained at all; aborts the run
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// A single call failed after exhausting its retry budget
    #[error("Request failed ({kind}): {message}")]
    RequestFailure {
        /// Classification of the final failure
        kind: RequestFailureKind,
        /// Operation context
        message: String,
    },

    /// A page of a listing could not be fetched
    #[error("Listing failed: {0}")]
    ListingFailure(String),

    /// A target folder could neither be created nor found
    #[error("Folder resolution failed for '{name}': {reason}")]
    FolderResolution {
        /// Name of the folder being resolved
        name: String,
        /// What went wrong
        reason: String,
    },

    /// The remote API did not accept a copy submission
    #[error("Copy of '{name}' rejected: {reason}")]
    CopyRejected {
        /// Desired name of the copy
        name: String,
        /// Status or transport error
        reason: String,
    },

    /// The remote API answered with a body that could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl MirrorError {
    /// Returns true for errors that must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }
}
