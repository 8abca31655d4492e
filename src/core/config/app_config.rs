// Configuration snapshot.
//
// Everything the run needs is read once at startup into `AppConfig` and then
// handed to each component explicitly. Nothing reads the environment after
// this point.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::sync::{FolderTarget, PortalCredentials};

pub const DEFAULT_DOWNLOAD_PATH: &str = "/tmp/codmon_downloads";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
pub const DEFAULT_MAX_POSTS_PER_PAGE: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where the service account key comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum ServiceAccountSource {
    /// The key JSON itself (what CI secrets usually hold).
    Inline(String),
    /// Path to a key file on disk.
    File(PathBuf),
}

// The inline variant holds a private key.
impl fmt::Debug for ServiceAccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("Inline(<redacted>)"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

impl ServiceAccountSource {
    fn parse(value: &str) -> Self {
        if value.trim_start().starts_with('{') {
            Self::Inline(value.to_string())
        } else {
            Self::File(PathBuf::from(value.trim()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
}

/// Wait budgets used while driving the portal and watching downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// How long to wait for an element or a popup window to show up.
    pub element_wait: Duration,
    /// How long a download may take before the attachment is skipped.
    pub download_timeout: Duration,
    pub download_poll_interval: Duration,
    /// Time the popup window is left open so the download can start.
    pub popup_settle: Duration,
    /// Pause after page transitions so onsen animations finish.
    pub ui_settle: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            element_wait: Duration::from_secs(10),
            download_timeout: Duration::from_secs(60),
            download_poll_interval: Duration::from_secs(1),
            popup_settle: Duration::from_secs(2),
            ui_settle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: PortalCredentials,
    pub folder: FolderTarget,
    pub service_account: Option<ServiceAccountSource>,
    pub download_dir: PathBuf,
    pub browser: BrowserConfig,
    pub timing: TimingConfig,
    pub max_posts_per_page: usize,
    pub dry_run: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let credentials = PortalCredentials {
            email: require("CODMON_EMAIL")?,
            password: require("CODMON_PASSWORD")?,
        };

        let folder = match (get("DRIVE_FOLDER_ID"), get("DRIVE_FOLDER_NAME")) {
            (Some(id), _) => FolderTarget::Id(id.trim().to_string()),
            (None, Some(name)) => FolderTarget::Name(name),
            (None, None) => return Err(ConfigError::Missing("DRIVE_FOLDER_NAME")),
        };

        let dry_run = parse_bool("DRY_RUN", get("DRY_RUN"), false)?;

        let service_account = match get("GOOGLE_SERVICE_ACCOUNT_KEY") {
            Some(value) => Some(ServiceAccountSource::parse(&value)),
            None if dry_run => None,
            None => return Err(ConfigError::Missing("GOOGLE_SERVICE_ACCOUNT_KEY")),
        };

        let download_dir = get("CODMON_DOWNLOAD_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_PATH));

        let browser = BrowserConfig {
            webdriver_url: get("WEBDRIVER_URL")
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
            headless: parse_bool("BROWSER_HEADLESS", get("BROWSER_HEADLESS"), true)?,
        };

        let mut timing = TimingConfig::default();
        if let Some(raw) = get("UI_SETTLE_MS") {
            let millis = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "UI_SETTLE_MS",
                reason: e.to_string(),
            })?;
            timing.ui_settle = Duration::from_millis(millis);
        }

        Ok(Self {
            credentials,
            folder,
            service_account,
            download_dir,
            browser,
            timing,
            max_posts_per_page: DEFAULT_MAX_POSTS_PER_PAGE,
            dry_run,
        })
    }
}

fn parse_bool(
    key: &'static str,
    value: Option<String>,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("CODMON_EMAIL", "parent@example.com"),
        ("CODMON_PASSWORD", "hunter2"),
        ("DRIVE_FOLDER_NAME", "CodmonFiles"),
        ("GOOGLE_SERVICE_ACCOUNT_KEY", "{\"client_email\":\"x\"}"),
    ];

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_lookup(lookup(BASE)).unwrap();

        assert_eq!(config.folder, FolderTarget::Name("CodmonFiles".to_string()));
        assert_eq!(config.download_dir, PathBuf::from(DEFAULT_DOWNLOAD_PATH));
        assert_eq!(config.browser.webdriver_url, DEFAULT_WEBDRIVER_URL);
        assert!(config.browser.headless);
        assert_eq!(config.max_posts_per_page, 20);
        assert_eq!(config.timing.download_timeout, Duration::from_secs(60));
        assert!(!config.dry_run);
        assert!(matches!(
            config.service_account,
            Some(ServiceAccountSource::Inline(_))
        ));
    }

    #[test]
    fn test_missing_password_is_fatal() {
        let pairs: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "CODMON_PASSWORD")
            .collect();
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("CODMON_PASSWORD"));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut pairs: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "CODMON_EMAIL")
            .collect();
        pairs.push(("CODMON_EMAIL", "  "));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("CODMON_EMAIL"));
    }

    #[test]
    fn test_folder_id_beats_name() {
        let mut pairs = BASE.to_vec();
        pairs.push(("DRIVE_FOLDER_ID", "1AbCdEf"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.folder, FolderTarget::Id("1AbCdEf".to_string()));
    }

    #[test]
    fn test_missing_folder_is_fatal() {
        let pairs: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "DRIVE_FOLDER_NAME")
            .collect();
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DRIVE_FOLDER_NAME"));
    }

    #[test]
    fn test_service_account_required_unless_dry_run() {
        let without_key: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "GOOGLE_SERVICE_ACCOUNT_KEY")
            .collect();
        let err = AppConfig::from_lookup(lookup(&without_key)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("GOOGLE_SERVICE_ACCOUNT_KEY"));

        let mut dry = without_key.clone();
        dry.push(("DRY_RUN", "true"));
        let config = AppConfig::from_lookup(lookup(&dry)).unwrap();
        assert!(config.dry_run);
        assert!(config.service_account.is_none());
    }

    #[test]
    fn test_service_account_path() {
        let mut pairs: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "GOOGLE_SERVICE_ACCOUNT_KEY")
            .collect();
        pairs.push(("GOOGLE_SERVICE_ACCOUNT_KEY", "/secrets/key.json"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.service_account,
            Some(ServiceAccountSource::File(PathBuf::from("/secrets/key.json")))
        );
    }

    #[test]
    fn test_debug_hides_inline_key() {
        let config = AppConfig::from_lookup(lookup(BASE)).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("client_email"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("BROWSER_HEADLESS", "sometimes"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "BROWSER_HEADLESS",
                ..
            }
        ));
    }

    #[test]
    fn test_ui_settle_override() {
        let mut pairs = BASE.to_vec();
        pairs.push(("UI_SETTLE_MS", "1500"));
        pairs.push(("CODMON_DOWNLOAD_PATH", "/var/tmp/dl"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.timing.ui_settle, Duration::from_millis(1500));
        assert_eq!(config.download_dir, PathBuf::from("/var/tmp/dl"));
    }
}
