// Ports the sync workflow depends on.
//
// - `Portal` drives the parent portal's UI.
// - `DriveStore` is the destination file store.
// - `DownloadWatcher` tells us when the browser has finished saving a file.
//
// Implementations live in the infra layer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use super::sync_models::{Attachment, DriveItem, PortalCredentials, PostDetail};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {0}")]
    ElementMissing(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Drive authentication failed: {0}")]
    Auth(String),

    #[error("Drive API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Folder {0} does not exist or is trashed")]
    FolderNotFound(String),
}

// ============================================================================
// TRAITS
// ============================================================================

/// Scripted access to the portal's resource room.
///
/// Posts are addressed by their position on the current page so callers never
/// hold on to element handles across navigations.
#[async_trait]
pub trait Portal: Send + Sync {
    async fn login(&self, credentials: &PortalCredentials) -> Result<(), PortalError>;

    /// Navigates from the home screen to the resource room listing.
    async fn open_resource_room(&self) -> Result<(), PortalError>;

    /// Number of posts listed on the current page.
    async fn post_count(&self) -> Result<usize, PortalError>;

    /// Opens the post at `index` and reads its detail page.
    async fn open_post(&self, index: usize) -> Result<PostDetail, PortalError>;

    /// Starts the download of an attachment of the currently open post.
    ///
    /// Returns once the popup window the portal opens has been closed again;
    /// the file may still be arriving on disk.
    async fn download_attachment(&self, attachment: &Attachment) -> Result<(), PortalError>;

    /// Leaves the detail page and returns to the listing.
    async fn back_to_posts(&self) -> Result<(), PortalError>;

    /// Advances to the next page. Returns `false` when already on the last one.
    async fn next_page(&self) -> Result<bool, PortalError>;

    /// Ends the browser session. Called once, however the run ended.
    async fn shutdown(&self) -> Result<(), PortalError>;
}

/// Destination folder operations.
#[async_trait]
pub trait DriveStore: Send + Sync {
    /// Non-trashed folders with exactly this name, in the order the API returns them.
    async fn find_folders(&self, name: &str) -> Result<Vec<DriveItem>, DriveError>;

    /// The folder with this id, or `None` if it is missing, trashed or not a folder.
    async fn get_folder(&self, id: &str) -> Result<Option<DriveItem>, DriveError>;

    async fn create_folder(&self, name: &str) -> Result<DriveItem, DriveError>;

    /// Whether a non-trashed file with exactly this name is in the folder.
    async fn file_exists(&self, folder_id: &str, name: &str) -> Result<bool, DriveError>;

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        path: &Path,
    ) -> Result<DriveItem, DriveError>;
}

#[async_trait]
pub trait DownloadWatcher: Send + Sync {
    /// Waits for `file_name` to appear in the download location.
    /// Returns `None` when it does not show up in time.
    async fn wait_for(&self, file_name: &str) -> Option<PathBuf>;

    /// Removes a previous download of `file_name`, if any.
    ///
    /// The browser would otherwise save a second file of the same name as
    /// `name (1).ext` and `wait_for` would return the old one.
    async fn discard(&self, file_name: &str);
}
