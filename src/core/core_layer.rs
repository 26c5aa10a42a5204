// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "soundcloud/mod.rs"]
pub mod soundcloud;

#[path = "drive/mod.rs"]
pub mod drive;
