// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "soundcloud/mod.rs"]
pub mod soundcloud;

#[path = "google_drive/mod.rs"]
pub mod google_drive;
