//! Run command - Mirror the configured source tree into the target
//!
//! Provides the `drivemirror run` CLI command which:
//! 1. Loads and validates the configuration
//! 2. Acquires an access token before any other request
//! 3. Resolves both drives and the source folder, creating the target path
//!    if it does not exist yet
//! 4. Runs the MirrorEngine with Ctrl+C / SIGTERM wired to cancellation
//! 5. Prints the run summary and exits with a status reflecting the outcome

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use drivemirror_core::config::{Config, CLIENT_SECRET_ENV};
use drivemirror_core::domain::{DirectoryMirrorTask, LogicalPath, RunStatistics};
use drivemirror_core::ports::IRemoteStorage;
use drivemirror_graph::auth::{ClientCredentialsSource, CredentialManager};
use drivemirror_graph::client::GraphClient;
use drivemirror_graph::drive::{ensure_path, resolve_drive, resolve_path};
use drivemirror_graph::provider::GraphRemoteStorage;
use drivemirror_sync::{MirrorEngine, MirrorOptions, MirrorReport};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::output::{format_duration, get_formatter, plural, OutputFormat, OutputFormatter};

/// Exit status when a directory did not converge or a subtree was skipped
const EXIT_INCOMPLETE: u8 = 2;
/// Exit status after an interrupt (128 + SIGINT)
const EXIT_CANCELLED: u8 = 130;

/// Upper bound for `auth.refresh_margin_secs`
const MAX_REFRESH_MARGIN_SECS: u64 = 86_400;

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Concurrent copy submissions per directory (overrides mirror.max_workers)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Reconciliation rounds per directory (overrides mirror.max_rounds)
    #[arg(long)]
    pub max_rounds: Option<u32>,
}

impl RunCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<ExitCode> {
        let formatter = get_formatter(format);

        // Step 1: Load and validate config
        let mut config = Config::load(config_path).with_context(|| {
            format!("Failed to load configuration from {}", config_path.display())
        })?;
        self.apply_overrides(&mut config);

        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            bail!(
                "configuration has {} error(s), see 'drivemirror config validate'",
                errors.len()
            );
        }
        info!(config_path = %config_path.display(), "Loaded configuration");

        // Step 2: Token warm-up
        let credentials = build_credentials(&config)?;
        let client = Arc::new(GraphClient::from_config(credentials, &config));
        client
            .warm_up()
            .await
            .context("Failed to acquire an access token")?;
        info!("Acquired access token");

        // Step 3: Resolve endpoints
        let root = resolve_root_task(&client, &config).await?;
        formatter.info(&format!(
            "Mirroring {}:{} -> {}:{}",
            root.source_drive, root.logical_path, root.target_drive, config.target.path
        ));

        // Step 4: Run the engine
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_signal(cancel.clone()));

        let storage: Arc<dyn IRemoteStorage> = Arc::new(GraphRemoteStorage::new(client));
        let engine = MirrorEngine::new(
            storage,
            MirrorOptions::from_config(&config.mirror),
            Arc::new(RunStatistics::new()),
        )
        .with_cancellation(cancel);

        let report = engine.run(root).await.context("Mirror run aborted")?;

        // Step 5: Summary
        print_report(formatter.as_ref(), format, &report)?;
        Ok(ExitCode::from(exit_status(&report)))
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(workers) = self.max_workers {
            config.mirror.max_workers = workers;
        }
        if let Some(rounds) = self.max_rounds {
            config.mirror.max_rounds = rounds;
        }
    }
}

fn build_credentials(config: &Config) -> Result<Arc<CredentialManager>> {
    let auth = &config.auth;
    let secret = auth.resolved_client_secret().ok_or_else(|| {
        anyhow!("No client secret configured (auth.client_secret or {CLIENT_SECRET_ENV})")
    })?;

    let source = ClientCredentialsSource::new(
        auth.client_id.clone(),
        secret,
        auth.resolved_token_url(),
        auth.scope.clone(),
    )
    .context("Failed to set up the token source")?;

    let margin_secs = auth.refresh_margin_secs.min(MAX_REFRESH_MARGIN_SECS) as i64;
    let margin = chrono::Duration::seconds(margin_secs);
    Ok(Arc::new(CredentialManager::with_refresh_margin(
        Arc::new(source),
        margin,
    )))
}

/// Resolves drives and folders into the root task
///
/// A missing source folder is an error; the target path is created segment
/// by segment below the target drive root.
async fn resolve_root_task(client: &GraphClient, config: &Config) -> Result<DirectoryMirrorTask> {
    let source_drive = resolve_drive(
        client,
        config.source.drive_id.as_deref(),
        config.source.user.as_deref(),
    )
    .await
    .context("Failed to resolve the source drive")?;
    let target_drive = resolve_drive(
        client,
        config.target.drive_id.as_deref(),
        config.target.user.as_deref(),
    )
    .await
    .context("Failed to resolve the target drive")?;

    let source_path = LogicalPath::new(&config.source.path).context("Invalid source.path")?;
    let target_path = LogicalPath::new(&config.target.path).context("Invalid target.path")?;

    let source_folder = resolve_path(client, &source_drive, &source_path)
        .await
        .context("Failed to look up the source folder")?
        .ok_or_else(|| {
            anyhow!("Source folder {source_path} does not exist in drive {source_drive}")
        })?;

    let target_root = resolve_path(client, &target_drive, &LogicalPath::root())
        .await
        .context("Failed to look up the target drive root")?
        .ok_or_else(|| anyhow!("Target drive {target_drive} has no root folder"))?;
    let target_folder = ensure_path(client, &target_drive, &target_root, &target_path)
        .await
        .with_context(|| format!("Failed to create target folder {target_path}"))?;

    info!(
        %source_drive,
        %source_path,
        %target_drive,
        %target_path,
        "Resolved mirror endpoints"
    );

    Ok(DirectoryMirrorTask::new(
        source_drive,
        source_folder,
        target_drive,
        target_folder,
        source_path,
    ))
}

/// Cancels `token` on Ctrl+C or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received SIGINT (Ctrl+C), waiting for in-flight copies");
        }
        _ = terminate => {
            warn!("Received SIGTERM, waiting for in-flight copies");
        }
    }
    token.cancel();
}

fn exit_status(report: &MirrorReport) -> u8 {
    if report.cancelled {
        EXIT_CANCELLED
    } else if report.is_complete() {
        0
    } else {
        EXIT_INCOMPLETE
    }
}

fn print_report(
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
    report: &MirrorReport,
) -> Result<()> {
    if format.is_json() {
        let json = serde_json::to_value(report).context("Failed to serialize the run report")?;
        formatter.print_json(&json);
        return Ok(());
    }

    let stats = &report.stats;
    let elapsed = format_duration(report.duration);

    if report.cancelled {
        formatter.warn(&format!("Mirror interrupted after {elapsed}"));
    } else if report.is_complete() && stats.copied == 0 {
        formatter.success("Already up to date");
    } else if report.is_complete() {
        formatter.success(&format!(
            "Mirror completed in {elapsed} ({})",
            plural(stats.copied, "copy request")
        ));
    } else {
        formatter.warn(&format!("Mirror finished incomplete after {elapsed}"));
    }

    formatter.field(
        "Started",
        &report
            .started_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S"),
    );
    formatter.field("Elapsed", &elapsed);
    formatter.field("Copy requests", &stats.copied);
    formatter.field("Failed submissions", &stats.failed);
    formatter.field("Retried files", &stats.retried);
    formatter.field("Folders created", &stats.folders_created);
    formatter.field("Incomplete dirs", &stats.incomplete_directories);
    formatter.field("Abandoned subtrees", &stats.abandoned_subtrees);

    if !report.is_complete() {
        formatter.info("");
    }
    for path in &report.exhausted {
        formatter.info(&format!("incomplete: {path}"));
    }
    for path in &report.unlisted {
        formatter.info(&format!("unreadable: {path}"));
    }
    for path in &report.abandoned {
        formatter.info(&format!("skipped:    {path}"));
    }

    Ok(())
}
