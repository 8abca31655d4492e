// Sync service - walks the portal's resource room and mirrors attachments to Drive.
//
// The run is strictly sequential:
// 1. Resolve (or create) the destination folder
// 2. Log into the portal and open the resource room
// 3. Page through the posts, downloading each attachment
// 4. Upload each download under "<period>_<file name>" unless that name exists
//
// NO WebDriver or HTTP dependencies here - everything goes through the ports.

use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::sync_models::{
    destination_name, sanitize_prefix, Attachment, FolderTarget, PortalCredentials, SyncReport,
    UploadOutcome,
};
use super::sync_ports::{DownloadWatcher, DriveError, DriveStore, Portal, PortalError};

// ============================================================================
// ERRORS
// ============================================================================

/// Errors that abort the whole run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Portal error: {0}")]
    Portal(#[from] PortalError),

    #[error("Drive error: {0}")]
    Drive(#[from] DriveError),
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Upper bound on posts processed per listing page.
    pub max_posts_per_page: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_posts_per_page: 20,
        }
    }
}

pub struct SyncService<P: Portal, D: DriveStore, W: DownloadWatcher> {
    portal: P,
    drive: D,
    watcher: W,
    settings: SyncSettings,
}

impl<P: Portal, D: DriveStore, W: DownloadWatcher> SyncService<P, D, W> {
    pub fn new(portal: P, drive: D, watcher: W, settings: SyncSettings) -> Self {
        Self {
            portal,
            drive,
            watcher,
            settings,
        }
    }

    /// `run`, followed by closing the browser whether or not the run succeeded.
    pub async fn run_to_completion(
        &self,
        credentials: &PortalCredentials,
        target: &FolderTarget,
    ) -> Result<SyncReport, SyncError> {
        let result = self.run(credentials, target).await;

        if let Err(e) = self.portal.shutdown().await {
            warn!("Failed to close the browser session: {}", e);
        }

        result
    }

    /// Full run: destination, login, then every page of posts.
    pub async fn run(
        &self,
        credentials: &PortalCredentials,
        target: &FolderTarget,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::start();

        let folder_id = self.resolve_destination(target).await?;
        info!(folder_id = %folder_id, "Destination folder resolved");

        self.portal.login(credentials).await?;
        info!("Logged into portal");

        self.portal.open_resource_room().await?;
        info!("Opened resource room");

        self.process_pages(&folder_id, &mut report).await?;

        report.finish();
        Ok(report)
    }

    /// Returns the id of the destination folder.
    ///
    /// By name: the first matching folder wins, and a new one is created only
    /// when none exist. Duplicate folders are left alone.
    pub async fn resolve_destination(&self, target: &FolderTarget) -> Result<String, SyncError> {
        match target {
            FolderTarget::Id(id) => match self.drive.get_folder(id).await? {
                Some(folder) => {
                    debug!(folder_id = %folder.id, name = %folder.name, "Using fixed folder id");
                    Ok(folder.id)
                }
                None => Err(DriveError::FolderNotFound(id.clone()).into()),
            },
            FolderTarget::Name(name) => {
                let folders = self.drive.find_folders(name).await?;
                if folders.len() > 1 {
                    warn!(
                        "{} folders named '{}' found, using the first one",
                        folders.len(),
                        name
                    );
                }

                if let Some(folder) = folders.into_iter().next() {
                    return Ok(folder.id);
                }

                let folder = self.drive.create_folder(name).await?;
                info!(folder_id = %folder.id, "Created folder '{}'", name);
                Ok(folder.id)
            }
        }
    }

    /// Uploads a downloaded file under its prefixed name, unless that name is taken.
    pub async fn upload(
        &self,
        folder_id: &str,
        prefix: &str,
        path: &Path,
    ) -> Result<UploadOutcome, DriveError> {
        let original = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DriveError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Not a file path: {}", path.display()),
                ))
            })?;
        let name = destination_name(prefix, original);

        if self.drive.file_exists(folder_id, &name).await? {
            info!(file = %name, "File already exists in the folder. Skipping upload.");
            return Ok(UploadOutcome::AlreadyPresent { name });
        }

        let item = self.drive.upload_file(folder_id, &name, path).await?;
        info!(file = %item.name, file_id = %item.id, folder_id = %folder_id, "Uploaded file");
        Ok(UploadOutcome::Uploaded(item))
    }

    async fn process_pages(
        &self,
        folder_id: &str,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        loop {
            report.pages += 1;
            let count = self.portal.post_count().await?;
            let limit = count.min(self.settings.max_posts_per_page);
            info!(page = report.pages, "Processing {} of {} post(s)", limit, count);

            for index in 0..limit {
                self.transfer_post(index, folder_id, report).await?;
            }

            if !self.portal.next_page().await? {
                debug!(page = report.pages, "Next button disabled, last page reached");
                return Ok(());
            }
        }
    }

    async fn transfer_post(
        &self,
        index: usize,
        folder_id: &str,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let post = self.portal.open_post(index).await?;
        let prefix = sanitize_prefix(&post.period_label);
        report.posts += 1;
        debug!(
            index,
            prefix = %prefix,
            "Opened post with {} attachment(s)",
            post.attachments.len()
        );

        for attachment in &post.attachments {
            report.attachments += 1;
            self.transfer_attachment(attachment, &prefix, folder_id, report)
                .await?;
        }

        self.portal.back_to_posts().await?;
        Ok(())
    }

    async fn transfer_attachment(
        &self,
        attachment: &Attachment,
        prefix: &str,
        folder_id: &str,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        // An earlier post may have had an attachment of the same name.
        self.watcher.discard(&attachment.file_name).await;

        info!(file = %attachment.file_name, "Downloading");
        self.portal.download_attachment(attachment).await?;

        let Some(path) = self.watcher.wait_for(&attachment.file_name).await else {
            warn!(file = %attachment.file_name, "Timeout: file was not downloaded");
            report.download_timeouts += 1;
            return Ok(());
        };

        let outcome = self.upload(folder_id, prefix, &path).await;
        self.watcher.discard(&attachment.file_name).await;

        match outcome {
            Ok(UploadOutcome::Uploaded(_)) => report.uploaded += 1,
            Ok(UploadOutcome::AlreadyPresent { .. }) => report.already_present += 1,
            Err(e) => {
                warn!(file = %attachment.file_name, "Upload failed: {}", e);
                report.upload_failures += 1;
            }
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
