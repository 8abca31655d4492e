use std::fmt;

use chrono::{DateTime, Utc};

/// Login details for the parent portal.
#[derive(Clone)]
pub struct PortalCredentials {
    pub email: String,
    pub password: String,
}

// Keep the password out of logs.
impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the destination Drive folder is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderTarget {
    /// A folder id that must already exist.
    Id(String),
    /// A folder name, created when no folder of that name exists.
    Name(String),
}

/// One attachment link on a post's detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Position among the post's attachment links.
    pub index: usize,
    /// Link text, which is also the name the browser saves the file under.
    pub file_name: String,
}

/// What we read from an opened post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDetail {
    pub period_label: String,
    pub attachments: Vec<Attachment>,
}

/// A file or folder in Drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveItem {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(DriveItem),
    /// A file with the generated name is already in the folder.
    AlreadyPresent { name: String },
}

/// Turns a published-period label into a file name prefix.
///
/// Only ASCII spaces are replaced; everything else is kept as-is.
pub fn sanitize_prefix(label: &str) -> String {
    label.trim().replace(' ', "_")
}

/// Name a downloaded file gets in the destination folder.
pub fn destination_name(prefix: &str, file_name: &str) -> String {
    format!("{}_{}", prefix, file_name)
}

/// Counters for a single run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages: usize,
    pub posts: usize,
    pub attachments: usize,
    pub uploaded: usize,
    pub already_present: usize,
    pub download_timeouts: usize,
    pub upload_failures: usize,
}

impl SyncReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            pages: 0,
            posts: 0,
            attachments: 0,
            uploaded: 0,
            already_present: 0,
            download_timeouts: 0,
            upload_failures: 0,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Items that were abandoned during the run.
    pub fn skipped(&self) -> usize {
        self.download_timeouts + self.upload_failures
    }

    pub fn summary(&self) -> String {
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or_default();

        format!(
            "{} page(s), {} post(s), {} attachment(s): {} uploaded, {} already present, \
             {} download timeout(s), {} upload failure(s) in {}s",
            self.pages,
            self.posts,
            self.attachments,
            self.uploaded,
            self.already_present,
            self.download_timeouts,
            self.upload_failures,
            elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_keeps_japanese_date() {
        let prefix = sanitize_prefix("2024年10月1日");
        assert_eq!(prefix, "2024年10月1日");
        assert_eq!(
            destination_name(&prefix, "report.pdf"),
            "2024年10月1日_report.pdf"
        );
    }

    #[test]
    fn test_prefix_replaces_internal_spaces() {
        assert_eq!(
            sanitize_prefix("  2024年10月1日 ~ 2024年10月31日 "),
            "2024年10月1日_~_2024年10月31日"
        );
    }

    #[test]
    fn test_prefix_leaves_fullwidth_space() {
        // U+3000 is not an ASCII space
        assert_eq!(sanitize_prefix("10月\u{3000}1日"), "10月\u{3000}1日");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = PortalCredentials {
            email: "a@b.c".to_string(),
            password: "secret".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("a@b.c"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_report_summary_counts() {
        let mut report = SyncReport::start();
        report.pages = 2;
        report.uploaded = 3;
        report.download_timeouts = 1;
        report.upload_failures = 1;
        report.finish();

        assert_eq!(report.skipped(), 2);
        let summary = report.summary();
        assert!(summary.starts_with("2 page(s)"));
        assert!(summary.contains("3 uploaded"));
    }
}
