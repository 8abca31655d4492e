// The infra module contains implementations of core traits.
// Each external system gets its own submodule.

#[path = "google_auth/service_account.rs"]
pub mod google_auth;

#[path = "drive/mod.rs"]
pub mod drive;

#[path = "codmon/mod.rs"]
pub mod codmon;

#[path = "scratch/scratch_dir.rs"]
pub mod scratch;
