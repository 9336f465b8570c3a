//! Microsoft Graph API client
//!
//! Provides the HTTP client every drive operation goes through. Each call
//! attaches a bearer token from the shared [`CredentialManager`] and runs
//! through [`GraphClient::execute_with_retry`], which absorbs throttling,
//! transient server errors, network failures and a single token rejection.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use drivemirror_graph::auth::{ClientCredentialsSource, CredentialManager};
//! use drivemirror_graph::client::GraphClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), drivemirror_graph::GraphError> {
//! let source = ClientCredentialsSource::new("id", "secret", "https://login/token", "scope")?;
//! let client = GraphClient::new(Arc::new(CredentialManager::new(Arc::new(source))));
//! let response = client.execute_with_retry(Method::GET, "/users/alice/drive", None).await?;
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use drivemirror_core::config::{Config, DEFAULT_GRAPH_BASE_URL};
use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::auth::CredentialManager;
use crate::rate_limit::{parse_retry_after, AdaptiveRateLimiter};
use crate::GraphError;

/// Default `$top` for listings (the Graph maximum)
pub const DEFAULT_PAGE_SIZE: u32 = 999;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Retry budget applied to every call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts for 5xx and network failures
    pub max_attempts: u32,
    /// First backoff delay; doubles on every further attempt
    pub base_delay: Duration,
    /// Wait on 429 when `Retry-After` is missing or unusable
    pub default_retry_after: Duration,
    /// 429 responses tolerated per call
    pub max_throttle_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            default_retry_after: Duration::from_secs(2),
            max_throttle_retries: 8,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with authentication, base URL construction and the
/// retry policy. Optionally integrates with an [`AdaptiveRateLimiter`] for
/// proactive rate limiting.
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Shared bearer-token cache
    credentials: Arc<CredentialManager>,
    /// Optional adaptive rate limiter for proactive throttling
    rate_limiter: Option<Arc<AdaptiveRateLimiter>>,
    retry: RetryPolicy,
    page_size: u32,
}

impl GraphClient {
    /// Creates a client against the public Graph v1.0 endpoint
    pub fn new(credentials: Arc<CredentialManager>) -> Self {
        Self::with_base_url(credentials, DEFAULT_GRAPH_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(credentials: Arc<CredentialManager>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            rate_limiter: None,
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Creates a client from the `graph` and `requests` configuration sections
    pub fn from_config(credentials: Arc<CredentialManager>, config: &Config) -> Self {
        let requests = &config.requests;
        let mut client = Self::with_base_url(credentials, config.graph.base_url.clone())
            .with_retry_policy(RetryPolicy {
                max_attempts: requests.max_attempts.max(1),
                base_delay: Duration::from_millis(requests.base_delay_ms),
                default_retry_after: Duration::from_secs(requests.default_retry_after_secs),
                max_throttle_retries: requests.max_throttle_retries,
            })
            .with_page_size(requests.page_size);

        if requests.requests_per_second > 0.0 {
            client = client.with_rate_limiter(Arc::new(AdaptiveRateLimiter::new(
                requests.burst,
                requests.requests_per_second,
            )));
        }
        client
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the listing page size, clamped to 1..=999
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    /// Sets the adaptive rate limiter for this client
    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn rate_limiter(&self) -> Option<&Arc<AdaptiveRateLimiter>> {
        self.rate_limiter.as_ref()
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Resolves an API path against the base URL; absolute URLs (such as
    /// `@odata.nextLink`) are used unchanged
    pub fn url_for(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}{}", self.base_url, path_or_url)
        }
    }

    /// Builds an absolute URL by appending percent-encoded path segments to
    /// the base URL
    pub fn segments_url<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<url::Url, GraphError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| GraphError::InvalidResponse(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GraphError::InvalidResponse("base URL cannot take a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Executes a request with throttling, backoff and token refresh handling.
    ///
    /// - **429**: waits for `Retry-After` (or the default) and retries; these
    ///   waits do not consume the transient attempt budget but are capped by
    ///   `max_throttle_retries`
    /// - **5xx / network failure**: exponential backoff, up to `max_attempts`
    /// - **401**: forces one credential refresh and retries once
    /// - **token endpoint outage**: shares the 5xx/network backoff budget;
    ///   only a refused credential fails immediately
    ///
    /// Any other status, success or not, is returned to the caller.
    pub async fn execute_with_retry(
        &self,
        method: Method,
        path_or_url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, GraphError> {
        let url = self.url_for(path_or_url);
        let mut transient_failures: u32 = 0;
        let mut throttled: u32 = 0;
        let mut refreshed = false;

        loop {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.acquire().await;
            }

            let token = match self.credentials.token().await {
                Ok(token) => token,
                Err(e) if e.is_transient() => {
                    transient_failures += 1;
                    self.back_off_token(&url, transient_failures, e).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    transient_failures += 1;
                    if transient_failures >= self.retry.max_attempts {
                        warn!(%url, attempts = transient_failures, error = %e, "Network retries exhausted");
                        return Err(GraphError::NetworkError(e));
                    }
                    let delay = self.retry.backoff(transient_failures);
                    warn!(%url, attempt = transient_failures, delay_ms = delay.as_millis(), error = %e, "Network failure, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                throttled += 1;
                if let Some(ref limiter) = self.rate_limiter {
                    limiter.on_throttle();
                }
                if throttled > self.retry.max_throttle_retries {
                    warn!(%url, attempts = throttled, "429 retry limit exhausted");
                    return Err(GraphError::TooManyRequests {
                        attempts: throttled,
                        url,
                    });
                }

                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_retry_after(v, self.retry.default_retry_after))
                    .unwrap_or(self.retry.default_retry_after);

                info!(
                    %url,
                    attempt = throttled,
                    retry_after_ms = retry_after.as_millis(),
                    "Received 429, backing off"
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    warn!(%url, "Token rejected again after refresh");
                    return Err(GraphError::Unauthorized(url));
                }
                match self.credentials.refresh_after_rejection(&token).await {
                    Ok(_) => refreshed = true,
                    Err(e) if e.is_transient() => {
                        transient_failures += 1;
                        self.back_off_token(&url, transient_failures, e).await?;
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }

            if status.is_server_error() {
                transient_failures += 1;
                if transient_failures >= self.retry.max_attempts {
                    warn!(%url, status = status.as_u16(), attempts = transient_failures, "Server error retries exhausted");
                    return Err(GraphError::ServerError {
                        status: status.as_u16(),
                        url,
                    });
                }
                let delay = self.retry.backoff(transient_failures);
                warn!(%url, status = status.as_u16(), attempt = transient_failures, delay_ms = delay.as_millis(), "Server error, backing off");
                tokio::time::sleep(delay).await;
                continue;
            }

            if let Some(ref limiter) = self.rate_limiter {
                limiter.on_success();
            }
            if transient_failures > 0 || throttled > 0 {
                debug!(%url, transient_failures, throttled, "Request succeeded after retry");
            }
            return Ok(response);
        }
    }

    /// Waits out a token endpoint outage, or returns `err` once the transient
    /// budget is spent
    async fn back_off_token(
        &self,
        url: &str,
        failures: u32,
        err: GraphError,
    ) -> Result<(), GraphError> {
        if failures >= self.retry.max_attempts {
            warn!(%url, attempts = failures, error = %err, "Token retries exhausted");
            return Err(err);
        }
        let delay = self.retry.backoff(failures);
        warn!(%url, attempt = failures, delay_ms = delay.as_millis(), error = %err, "Token endpoint unavailable, backing off");
        tokio::time::sleep(delay).await;
        Ok(())
    }

    /// Acquires a token under the same transient budget as API calls
    pub async fn warm_up(&self) -> Result<(), GraphError> {
        let mut failures: u32 = 0;
        loop {
            match self.credentials.token().await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() => {
                    failures += 1;
                    self.back_off_token("token", failures, e).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
