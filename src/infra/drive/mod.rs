// Google Drive infra layer.
// - `drive_client.rs` talks to the Drive v3 REST API.
// - `in_memory.rs` stands in for Drive on dry runs.

pub mod drive_client;
pub mod in_memory;

pub use drive_client::GoogleDriveClient;
pub use in_memory::InMemoryDrive;
