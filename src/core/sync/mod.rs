pub mod sync_models;
pub mod sync_ports;
pub mod sync_service;

pub use sync_models::{Attachment, DriveItem, FolderTarget, PortalCredentials, PostDetail};
pub use sync_ports::{DownloadWatcher, DriveError, DriveStore, Portal, PortalError};
pub use sync_service::{SyncService, SyncSettings};
