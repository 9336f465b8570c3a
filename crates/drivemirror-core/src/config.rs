//! Configuration module for DriveMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that overrides `auth.client_secret`.
pub const CLIENT_SECRET_ENV: &str = "DRIVEMIRROR_CLIENT_SECRET";

/// Default Microsoft Graph v1.0 endpoint.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default client-credentials scope for Microsoft Graph.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriveMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub source: EndpointConfig,
    pub target: EndpointConfig,
    pub mirror: MirrorConfig,
    pub requests: RequestConfig,
    pub graph: GraphConfig,
    pub logging: LoggingConfig,
}

/// App-only (client credentials) authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Azure AD tenant ID.
    pub tenant_id: String,
    /// Application (client) ID.
    pub client_id: String,
    /// Client secret. Prefer the `DRIVEMIRROR_CLIENT_SECRET` environment variable.
    pub client_secret: Option<String>,
    /// Scope requested with the client-credentials grant.
    pub scope: String,
    /// Token endpoint override. Derived from `tenant_id` when absent.
    pub token_url: Option<String>,
    /// Seconds before expiry at which a cached token is renewed.
    pub refresh_margin_secs: u64,
}

/// One side of the replication: which drive and which folder in it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Explicit drive ID. Takes precedence over `user`.
    pub drive_id: Option<String>,
    /// User principal name whose default drive is used.
    pub user: Option<String>,
    /// Folder path inside the drive; empty means the drive root.
    pub path: String,
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Concurrent copy submissions within one directory round.
    pub max_workers: usize,
    /// Listing/diff/copy rounds per directory before giving up on it.
    pub max_rounds: u32,
    /// Base wait after a copy round for asynchronous copies to land.
    pub propagation_base_secs: u64,
    /// Extra wait added per round index.
    pub propagation_step_secs: u64,
    /// Wait after a failed listing before the next round.
    pub listing_retry_secs: u64,
}

/// Request executor (retry and throttling) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Attempts per call for 5xx and network failures.
    pub max_attempts: u32,
    /// First backoff delay; doubles on each further attempt.
    pub base_delay_ms: u64,
    /// Wait on 429 when the response carries no usable `Retry-After`.
    pub default_retry_after_secs: u64,
    /// 429 responses tolerated per call before giving up.
    pub max_throttle_retries: u32,
    /// `$top` page size for listings (Graph allows at most 999).
    pub page_size: u32,
    /// Proactive request rate; 0 disables the limiter.
    pub requests_per_second: f64,
    /// Burst capacity of the proactive limiter.
    pub burst: u32,
}

/// Remote API endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub base_url: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivemirror")
            .join("config.yaml")
    }
}

impl AuthConfig {
    /// Client secret with the environment override applied.
    pub fn resolved_client_secret(&self) -> Option<String> {
        std::env::var(CLIENT_SECRET_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.client_secret.clone().filter(|s| !s.is_empty()))
    }

    /// Token endpoint, derived from the tenant unless overridden.
    pub fn resolved_token_url(&self) -> String {
        self.token_url.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.tenant_id
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: None,
            scope: DEFAULT_SCOPE.to_string(),
            token_url: None,
            refresh_margin_secs: 300,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_workers: 15,
            max_rounds: 4,
            propagation_base_secs: 3,
            propagation_step_secs: 2,
            listing_retry_secs: 2,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1000,
            default_retry_after_secs: 2,
            max_throttle_retries: 8,
            page_size: 999,
            requests_per_second: 0.0,
            burst: 20,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"mirror.max_workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn must_be_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

fn validate_endpoint(errors: &mut Vec<ValidationError>, name: &str, endpoint: &EndpointConfig) {
    let has_drive = endpoint.drive_id.as_deref().is_some_and(|s| !s.is_empty());
    let has_user = endpoint.user.as_deref().is_some_and(|s| !s.is_empty());
    if !has_drive && !has_user {
        errors.push(ValidationError {
            field: format!("{name}.drive_id"),
            message: "either drive_id or user must be set".into(),
        });
    }
    if endpoint
        .path
        .split(['/', '\\'])
        .any(|segment| segment == "." || segment == "..")
    {
        errors.push(ValidationError {
            field: format!("{name}.path"),
            message: format!("relative segments are not allowed: {}", endpoint.path),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- auth ---
        if self.auth.tenant_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "auth.tenant_id".into(),
                message: "must be set".into(),
            });
        }
        if self.auth.client_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "auth.client_id".into(),
                message: "must be set".into(),
            });
        }
        if self.auth.resolved_client_secret().is_none() {
            errors.push(ValidationError {
                field: "auth.client_secret".into(),
                message: format!("must be set in the file or via {CLIENT_SECRET_ENV}"),
            });
        }
        if self.auth.scope.trim().is_empty() {
            errors.push(ValidationError {
                field: "auth.scope".into(),
                message: "must be set".into(),
            });
        }

        // --- endpoints ---
        validate_endpoint(&mut errors, "source", &self.source);
        validate_endpoint(&mut errors, "target", &self.target);

        // --- mirror ---
        must_be_positive(&mut errors, "mirror.max_workers", self.mirror.max_workers as u64);
        must_be_positive(&mut errors, "mirror.max_rounds", self.mirror.max_rounds as u64);

        // --- requests ---
        must_be_positive(
            &mut errors,
            "requests.max_attempts",
            self.requests.max_attempts as u64,
        );
        if self.requests.page_size == 0 || self.requests.page_size > 999 {
            errors.push(ValidationError {
                field: "requests.page_size".into(),
                message: "must be in range 1..=999".into(),
            });
        }
        if self.requests.requests_per_second < 0.0
            || !self.requests.requests_per_second.is_finite()
        {
            errors.push(ValidationError {
                field: "requests.requests_per_second".into(),
                message: "must be a finite value >= 0".into(),
            });
        }
        if self.requests.requests_per_second > 0.0 {
            must_be_positive(&mut errors, "requests.burst", self.requests.burst as u64);
        }

        // --- graph ---
        if !(self.graph.base_url.starts_with("http://")
            || self.graph.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "graph.base_url".into(),
                message: format!("must be an http(s) URL: {}", self.graph.base_url),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivemirror_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .auth("tenant", "client", "secret")
///     .source_user("alice@contoso.com", "/Projects")
///     .target_user("bob@contoso.com", "/Archive/Projects")
///     .mirror_max_workers(8)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- auth ---

    pub fn auth(
        mut self,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.auth.tenant_id = tenant_id.into();
        self.config.auth.client_id = client_id.into();
        self.config.auth.client_secret = Some(client_secret.into());
        self
    }

    pub fn auth_token_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.token_url = Some(url.into());
        self
    }

    // --- endpoints ---

    pub fn source_user(mut self, user: impl Into<String>, path: impl Into<String>) -> Self {
        self.config.source.user = Some(user.into());
        self.config.source.path = path.into();
        self
    }

    pub fn source_drive(mut self, drive_id: impl Into<String>, path: impl Into<String>) -> Self {
        self.config.source.drive_id = Some(drive_id.into());
        self.config.source.path = path.into();
        self
    }

    pub fn target_user(mut self, user: impl Into<String>, path: impl Into<String>) -> Self {
        self.config.target.user = Some(user.into());
        self.config.target.path = path.into();
        self
    }

    pub fn target_drive(mut self, drive_id: impl Into<String>, path: impl Into<String>) -> Self {
        self.config.target.drive_id = Some(drive_id.into());
        self.config.target.path = path.into();
        self
    }

    // --- mirror ---

    pub fn mirror_max_workers(mut self, n: usize) -> Self {
        self.config.mirror.max_workers = n;
        self
    }

    pub fn mirror_max_rounds(mut self, n: u32) -> Self {
        self.config.mirror.max_rounds = n;
        self
    }

    // --- requests ---

    pub fn requests_max_attempts(mut self, n: u32) -> Self {
        self.config.requests.max_attempts = n;
        self
    }

    pub fn requests_rate(mut self, per_second: f64, burst: u32) -> Self {
        self.config.requests.requests_per_second = per_second;
        self.config.requests.burst = burst;
        self
    }

    // --- graph ---

    pub fn graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph.base_url = url.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
