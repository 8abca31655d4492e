// Scratch directory the browser downloads into.
//
// The directory is owned by this process for the length of a run: it is
// emptied at startup and polled for finished downloads afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::time::{sleep, Instant};

use crate::core::sync::DownloadWatcher;

/// Result of emptying the scratch directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClearSummary {
    pub removed: usize,
    pub failed: usize,
}

pub struct ScratchDir {
    path: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl ScratchDir {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            poll_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the directory and clears out whatever a previous run left behind.
    ///
    /// Failing to create the directory is an error. Failing to delete a single
    /// entry is logged and skipped.
    pub async fn prepare(&self) -> std::io::Result<ClearSummary> {
        fs::create_dir_all(&self.path).await?;
        tracing::info!("Download directory created/verified: {}", self.path.display());

        let summary = self.clear().await?;
        tracing::info!(
            removed = summary.removed,
            failed = summary.failed,
            "Download folder cleared: {}",
            self.path.display()
        );
        Ok(summary)
    }

    async fn clear(&self) -> std::io::Result<ClearSummary> {
        let mut summary = ClearSummary::default();
        let mut entries = fs::read_dir(&self.path).await?;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read download folder entry: {}", e);
                    summary.failed += 1;
                    break;
                }
            };

            let path = entry.path();
            match remove_entry(&path).await {
                Ok(()) => summary.removed += 1,
                Err(e) => {
                    tracing::warn!("Failed to delete {}. Reason: {}", path.display(), e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Where a download called `file_name` ends up.
    ///
    /// Only the last path component is used, so a name like `../x` stays inside.
    pub fn expected_path(&self, file_name: &str) -> Option<PathBuf> {
        Path::new(file_name.trim())
            .file_name()
            .map(|name| self.path.join(name))
    }
}

async fn remove_entry(path: &Path) -> std::io::Result<()> {
    // symlink_metadata so a link to a directory is removed, not followed
    let meta = fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

#[async_trait]
impl DownloadWatcher for ScratchDir {
    async fn wait_for(&self, file_name: &str) -> Option<PathBuf> {
        let path = self.expected_path(file_name)?;
        let deadline = Instant::now() + self.timeout;

        loop {
            if fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!("Download finished: {}", path.display());
                return Some(path);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn discard(&self, file_name: &str) {
        let Some(path) = self.expected_path(file_name) else {
            return;
        };
        match remove_entry(&path).await {
            Ok(()) => tracing::debug!("Removed download: {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to delete {}. Reason: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch(dir: &Path, timeout_ms: u64) -> ScratchDir {
        ScratchDir::new(
            dir,
            Duration::from_millis(timeout_ms),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_prepare_empty_directory_deletes_nothing() {
        let tmp = TempDir::new().unwrap();
        let summary = scratch(tmp.path(), 50).prepare().await.unwrap();
        assert_eq!(summary, ClearSummary::default());
    }

    #[tokio::test]
    async fn test_prepare_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("codmon").join("downloads");

        scratch(&nested, 50).prepare().await.unwrap();

        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_prepare_removes_files_and_directories() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("old.pdf"), b"x").unwrap();
        std::fs::write(tmp.path().join("half.pdf.crdownload"), b"x").unwrap();
        std::fs::create_dir_all(tmp.path().join("sub").join("deeper")).unwrap();
        std::fs::write(tmp.path().join("sub").join("deeper").join("a.txt"), b"x").unwrap();

        let summary = scratch(tmp.path(), 50).prepare().await.unwrap();

        assert_eq!(summary.removed, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_existing_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("report.pdf"), b"x").unwrap();

        let found = scratch(tmp.path(), 50).wait_for("report.pdf").await;

        assert_eq!(found, Some(tmp.path().join("report.pdf")));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let tmp = TempDir::new().unwrap();

        let found = scratch(tmp.path(), 50).wait_for("never.pdf").await;

        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_wait_for_file_arriving_later() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("late.pdf");
        let writer_target = target.clone();

        let writer = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            fs::write(writer_target, b"x").await.unwrap();
        });

        let found = scratch(tmp.path(), 2_000).wait_for("late.pdf").await;
        writer.await.unwrap();

        assert_eq!(found, Some(target));
    }

    #[tokio::test]
    async fn test_discarded_file_is_not_found_again() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("menu.pdf"), b"OCTOBER").unwrap();
        let dir = scratch(tmp.path(), 50);

        let first = dir.wait_for("menu.pdf").await.unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), b"OCTOBER");

        dir.discard("menu.pdf").await;

        assert_eq!(dir.wait_for("menu.pdf").await, None);
    }

    #[tokio::test]
    async fn test_discard_missing_file_is_quiet() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("keep.pdf"), b"x").unwrap();
        let dir = scratch(tmp.path(), 50);

        dir.discard("menu.pdf").await;
        dir.discard("..").await;

        assert!(tmp.path().join("keep.pdf").exists());
    }

    #[test]
    fn test_expected_path_stays_inside() {
        let dir = ScratchDir::new("/tmp/dl", Duration::ZERO, Duration::ZERO);
        assert_eq!(
            dir.expected_path("../../etc/passwd"),
            Some(PathBuf::from("/tmp/dl/passwd"))
        );
        assert_eq!(
            dir.expected_path(" report.pdf "),
            Some(PathBuf::from("/tmp/dl/report.pdf"))
        );
        assert_eq!(dir.expected_path(".."), None);
    }
}
