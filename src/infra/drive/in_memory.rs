use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::sync::{DriveError, DriveItem, DriveStore};

/// Drive stand-in used with `DRY_RUN=true`.
///
/// Nothing leaves the machine; uploads are recorded by name so the
/// dedup behaviour matches a real run within the same process.
pub struct InMemoryDrive {
    /// folder id -> folder
    folders: DashMap<String, DriveItem>,
    /// (folder id, file name) -> file id
    files: DashMap<(String, String), String>,
    next_id: AtomicU64,
}

impl InMemoryDrive {
    pub fn new() -> Self {
        Self {
            folders: DashMap::new(),
            files: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self, kind: &str) -> String {
        format!("dry-run-{}-{}", kind, self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InMemoryDrive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriveStore for InMemoryDrive {
    async fn find_folders(&self, name: &str) -> Result<Vec<DriveItem>, DriveError> {
        let mut found: Vec<DriveItem> = self
            .folders
            .iter()
            .filter(|entry| entry.value().name == name)
            .map(|entry| entry.value().clone())
            .collect();
        // DashMap iteration order is arbitrary
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn get_folder(&self, id: &str) -> Result<Option<DriveItem>, DriveError> {
        if let Some(folder) = self.folders.get(id) {
            return Ok(Some(folder.clone()));
        }

        // A fixed id on a dry run refers to a real folder we cannot see.
        let folder = DriveItem {
            id: id.to_string(),
            name: id.to_string(),
        };
        self.folders.insert(id.to_string(), folder.clone());
        Ok(Some(folder))
    }

    async fn create_folder(&self, name: &str) -> Result<DriveItem, DriveError> {
        let folder = DriveItem {
            id: self.allocate_id("folder"),
            name: name.to_string(),
        };
        tracing::info!(folder_id = %folder.id, "[dry run] would create folder '{}'", name);
        self.folders.insert(folder.id.clone(), folder.clone());
        Ok(folder)
    }

    async fn file_exists(&self, folder_id: &str, name: &str) -> Result<bool, DriveError> {
        Ok(self
            .files
            .contains_key(&(folder_id.to_string(), name.to_string())))
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        path: &Path,
    ) -> Result<DriveItem, DriveError> {
        let size = tokio::fs::metadata(path).await?.len();
        let id = self.allocate_id("file");
        tracing::info!(
            file = %name,
            bytes = size,
            folder_id = %folder_id,
            "[dry run] would upload {}",
            path.display()
        );
        self.files
            .insert((folder_id.to_string(), name.to_string()), id.clone());
        Ok(DriveItem {
            id,
            name: name.to_string(),
        })
    }
}
