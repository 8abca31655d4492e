// The core module contains the sync workflow logic.
// Nothing in here knows about WebDriver, HTTP or the filesystem layout;
// those live behind the traits in `sync/sync_ports.rs`.

#[path = "config/app_config.rs"]
pub mod config;

#[path = "sync/mod.rs"]
pub mod sync;
