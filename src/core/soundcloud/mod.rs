pub mod oauth_state;
pub mod soundcloud_models;

pub use oauth_state::OAuthStateRegistry;
pub use soundcloud_models::{
    AccountSnapshot, CreatePlaylistParams, SoundCloudError, SoundCloudUser,
    TokenDocument, TokenState, TokenStore, UploadTrackParams, DEFAULT_TOKEN_TYPE,
    SOUNDCLOUD_TOKEN_KEY,
};
