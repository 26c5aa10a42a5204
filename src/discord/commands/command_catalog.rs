// Discord commands module.
// Each feature gets its own command file.

use std::sync::Arc;

use crate::core::drive::DriveSyncService;
use crate::core::soundcloud::OAuthStateRegistry;
use crate::infra::google_drive::GoogleDriveClient;
use crate::infra::soundcloud::{SoundCloudClient, SqliteTokenStore};

pub mod drive;
pub mod soundcloud;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub type SoundCloud = SoundCloudClient<SqliteTokenStore>;
pub type DriveSync = DriveSyncService<GoogleDriveClient>;

/// Services shared by every command and by the web routes.
#[derive(Clone)]
pub struct Data {
    pub soundcloud: Arc<SoundCloud>,
    pub oauth_states: Arc<OAuthStateRegistry>,
    /// `None` when no Google service account is configured.
    pub drive: Option<Arc<DriveSync>>,
}

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![soundcloud::sc(), drive::drive()]
}
