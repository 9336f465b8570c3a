//! App-only authentication for Microsoft Graph API
//!
//! Implements the OAuth2 client-credentials grant and a shared token cache
//! used by every concurrent request of a run.
//!
//! ## Components
//!
//! - [`TokenSource`] - Anything that can mint a fresh access token
//! - [`ClientCredentialsSource`] - `oauth2`-backed source for a tenant/app pair
//! - [`CredentialManager`] - Caches the token, renews it ahead of expiry, and
//!   guarantees a single refresh when many callers observe a rejection at once
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use drivemirror_graph::auth::{ClientCredentialsSource, CredentialManager};
//!
//! # async fn example() -> Result<(), drivemirror_graph::GraphError> {
//! let source = ClientCredentialsSource::new(
//!     "client-id",
//!     "client-secret",
//!     "https://login.microsoftonline.com/tenant/oauth2/v2.0/token",
//!     "https://graph.microsoft.com/.default",
//! )?;
//! let credentials = CredentialManager::new(Arc::new(source));
//! let token = credentials.token().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::{BasicClient, BasicErrorResponseType, BasicRequestTokenError},
    ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RequestTokenError,
    Scope, TokenResponse, TokenUrl,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::GraphError;

/// Default renewal margin before expiry (5 minutes)
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// TokenSource
// ============================================================================

/// A freshly issued access token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    /// Lifetime reported by the identity platform, if any
    pub expires_in: Option<std::time::Duration>,
}

/// Mints access tokens; the credential cache calls it only when needed
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<IssuedToken, GraphError>;
}

// ============================================================================
// ClientCredentialsSource
// ============================================================================

/// OAuth2 client-credentials grant against the Microsoft identity platform
pub struct ClientCredentialsSource {
    client: BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    http: reqwest::Client,
    scope: String,
}

impl ClientCredentialsSource {
    /// Creates a source for the given application
    ///
    /// # Errors
    /// [`GraphError::Auth`] if `token_url` is not a valid URL.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let token_url = TokenUrl::new(token_url.into())
            .map_err(|e| GraphError::Auth(format!("Invalid token URL: {e}")))?;

        let client = BasicClient::new(ClientId::new(client_id.into()))
            .set_client_secret(ClientSecret::new(client_secret.into()))
            .set_token_uri(token_url);

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GraphError::Auth(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            http,
            scope: scope.into(),
        })
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsSource {
    async fn fetch_token(&self) -> Result<IssuedToken, GraphError> {
        debug!(scope = %self.scope, "Requesting client-credentials token");

        let response = self
            .client
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope.clone()))
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;

        Ok(IssuedToken {
            access_token: response.access_token().secret().to_string(),
            expires_in: response.expires_in(),
        })
    }
}

/// Splits token endpoint failures into credential rejections and outages
///
/// Only a well-formed OAuth2 error response means the credentials were
/// refused. Transport failures and unparseable or empty error bodies (the
/// usual shape of a 5xx from a gateway) are outages a later attempt can get
/// past.
fn classify_token_error(
    err: BasicRequestTokenError<HttpClientError<reqwest::Error>>,
) -> GraphError {
    match err {
        RequestTokenError::ServerResponse(response) => match response.error() {
            BasicErrorResponseType::Extension(code) if code == "temporarily_unavailable" => {
                GraphError::TokenUnavailable(code.clone())
            }
            _ => GraphError::Auth(format!("Token request rejected: {response}")),
        },
        RequestTokenError::Request(e) => {
            GraphError::TokenUnavailable(format!("Token request failed: {e}"))
        }
        RequestTokenError::Parse(e, _) => {
            GraphError::TokenUnavailable(format!("Unreadable token response: {e}"))
        }
        RequestTokenError::Other(reason) => GraphError::TokenUnavailable(reason),
    }
}

// ============================================================================
// CredentialManager
// ============================================================================

/// Cached bearer credential
#[derive(Debug, Clone)]
struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Shared bearer-token cache
///
/// The cache lock is held across the call to the [`TokenSource`], so callers
/// that arrive while a refresh is in flight wait for it and reuse its result.
pub struct CredentialManager {
    source: Arc<dyn TokenSource>,
    refresh_margin: Duration,
    current: Mutex<Option<Credential>>,
}

impl CredentialManager {
    /// Creates a manager with the default 5 minute renewal margin
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self::with_refresh_margin(source, Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS))
    }

    pub fn with_refresh_margin(source: Arc<dyn TokenSource>, refresh_margin: Duration) -> Self {
        Self {
            source,
            refresh_margin,
            current: Mutex::new(None),
        }
    }

    /// Returns a usable token, fetching one if none is cached or the cached
    /// one expires within the renewal margin
    pub async fn token(&self) -> Result<String, GraphError> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref() {
            if credential.expires_at - self.refresh_margin > Utc::now() {
                return Ok(credential.token.clone());
            }
            debug!(expires_at = %credential.expires_at, "Cached token is near expiry");
        }
        self.refresh_locked(&mut current).await
    }

    /// Forces a refresh after the API rejected `rejected`
    ///
    /// If another caller already replaced that token, the newer one is
    /// returned without contacting the identity platform again.
    pub async fn refresh_after_rejection(&self, rejected: &str) -> Result<String, GraphError> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref() {
            if credential.token != rejected {
                debug!("Token already refreshed by another request");
                return Ok(credential.token.clone());
            }
        }
        warn!("Access token rejected, forcing refresh");
        self.refresh_locked(&mut current).await
    }

    async fn refresh_locked(&self, slot: &mut Option<Credential>) -> Result<String, GraphError> {
        let issued = self.source.fetch_token().await?;

        let lifetime = issued
            .expires_in
            .and_then(|d| Duration::from_std(d).ok())
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        let expires_at = Utc::now() + lifetime;

        info!(%expires_at, "Obtained access token");
        *slot = Some(Credential {
            token: issued.access_token.clone(),
            expires_at,
        });
        Ok(issued.access_token)
    }
}
