// Entry point: mirror Codmon resource-room attachments into Google Drive.
//
// **Architecture Overview:**
// - `core/` = Sync workflow and the ports it needs (no browser or HTTP code)
// - `infra/` = Implementations of those ports (WebDriver, Drive API, filesystem)
//
// This file's job is to:
// 1. Set up logging and load the configuration snapshot
// 2. Prepare the scratch directory and the Drive client
// 3. Start the browser and run the sync
// 4. Always close the browser, however the run ended

#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::AppConfig;
use crate::core::sync::{DriveStore, SyncService, SyncSettings};
use crate::infra::codmon::CodmonPortal;
use crate::infra::drive::{GoogleDriveClient, InMemoryDrive};
use crate::infra::google_auth::scope_for;
use crate::infra::scratch::ScratchDir;

const DEFAULT_LOG_FILE: &str = "codmon_2_gdrive.log";

/// Logs go to stdout and are appended to a local file.
fn init_tracing(log_path: &str) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let log_path =
        std::env::var("CODMON_LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    if let Err(e) = init_tracing(&log_path) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Run failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;

    let scratch = ScratchDir::new(
        &config.download_dir,
        config.timing.download_timeout,
        config.timing.download_poll_interval,
    );
    scratch
        .prepare()
        .await
        .with_context(|| format!("Cannot use download directory {}", config.download_dir.display()))?;

    // Chrome wants an absolute download path.
    let download_dir = tokio::fs::canonicalize(scratch.path()).await?;

    if config.dry_run {
        tracing::warn!("DRY_RUN is set: nothing will be uploaded to Drive");
        return sync_with(&config, InMemoryDrive::new(), scratch, &download_dir).await;
    }

    let source = config
        .service_account
        .as_ref()
        .context("GOOGLE_SERVICE_ACCOUNT_KEY is not set")?;
    let drive = GoogleDriveClient::from_source(source, scope_for(&config.folder))
        .await
        .context("Failed to set up the Drive client")?;

    sync_with(&config, drive, scratch, &download_dir).await
}

async fn sync_with<D: DriveStore>(
    config: &AppConfig,
    drive: D,
    scratch: ScratchDir,
    download_dir: &Path,
) -> anyhow::Result<()> {
    let portal = CodmonPortal::connect(&config.browser, &config.timing, download_dir).await?;

    let settings = SyncSettings {
        max_posts_per_page: config.max_posts_per_page,
    };
    let service = SyncService::new(portal, drive, scratch, settings);

    let report = service
        .run_to_completion(&config.credentials, &config.folder)
        .await?;
    if report.skipped() > 0 {
        tracing::warn!("{} attachment(s) were skipped, see above", report.skipped());
    }
    tracing::info!("Sync finished: {}", report.summary());
    Ok(())
}
