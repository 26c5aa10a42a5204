pub mod soundcloud_client;
pub mod sqlite_token_store;

#[cfg(test)]
pub mod in_memory;

pub use soundcloud_client::{ApiRequest, SoundCloudClient, SoundCloudConfig};
pub use sqlite_token_store::SqliteTokenStore;
