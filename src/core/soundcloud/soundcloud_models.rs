// SoundCloud domain types shared between the core and the infra adapters.
//
// NO HTTP or Discord dependencies here - the token lifecycle itself lives in
// `infra/soundcloud/soundcloud_client.rs`, this file only describes the data
// and the storage port it persists through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key of the one and only token document. The label has a single account.
pub const SOUNDCLOUD_TOKEN_KEY: &str = "soundcloud";

/// Authorization header prefix SoundCloud hands out when the token response
/// does not specify one.
pub const DEFAULT_TOKEN_TYPE: &str = "OAuth";

// ============================================================================
// ERRORS
// ============================================================================

/// Everything that can go wrong while talking to SoundCloud.
#[derive(Debug, Error)]
pub enum SoundCloudError {
    #[error("SoundCloud is not connected")]
    NotConnected,

    #[error("SoundCloud auth expired or revoked")]
    AuthExpired,

    #[error("SoundCloud API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Token storage error: {0}")]
    Store(String),

    #[error("Could not read upload file: {0}")]
    File(String),
}

impl SoundCloudError {
    /// Text shown to Discord users. Handshake and storage details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConnected => "Not connected. Use `/sc connect` first.".to_string(),
            Self::AuthExpired => {
                "SoundCloud auth expired or revoked. Run `/sc connect` again.".to_string()
            }
            Self::Api { status, .. } => format!("SoundCloud API error ({status})."),
            Self::TokenExchangeFailed(_) | Self::RefreshFailed(_) => {
                "SoundCloud login failed. Run `/sc connect` again.".to_string()
            }
            Self::Http(_) | Self::Store(_) => {
                "Something went wrong talking to SoundCloud, try again later.".to_string()
            }
            Self::File(_) => "The file to upload could not be read.".to_string(),
        }
    }
}

// ============================================================================
// MODELS
// ============================================================================

/// Cached profile info, only used for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountSnapshot {
    pub id: Option<u64>,
    pub username: Option<String>,
    pub permalink: Option<String>,
    pub avatar_url: Option<String>,
}

/// The `/me` resource, trimmed to what the bot reads.
#[derive(Debug, Clone, Deserialize)]
pub struct SoundCloudUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub permalink_url: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<SoundCloudUser> for AccountSnapshot {
    fn from(user: SoundCloudUser) -> Self {
        Self {
            id: Some(user.id),
            username: Some(user.username),
            permalink: user.permalink_url.or(user.permalink),
            avatar_url: user.avatar_url,
        }
    }
}

/// The persisted token record. The durable copy is the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDocument {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub account: Option<AccountSnapshot>,
}

/// In-memory view of the credentials, refreshed from storage after every write.
///
/// `access_token` is `None` until the first successful code exchange and
/// never holds an empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    /// Informational only. Refreshes happen in reaction to 401/403.
    pub expires_at: Option<DateTime<Utc>>,
    pub account: Option<AccountSnapshot>,
}

impl Default for TokenState {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            scope: None,
            expires_at: None,
            account: None,
        }
    }
}

impl From<TokenDocument> for TokenState {
    fn from(doc: TokenDocument) -> Self {
        Self {
            access_token: Some(doc.access_token).filter(|t| !t.is_empty()),
            refresh_token: doc.refresh_token.filter(|t| !t.is_empty()),
            token_type: if doc.token_type.is_empty() {
                DEFAULT_TOKEN_TYPE.to_string()
            } else {
                doc.token_type
            },
            scope: doc.scope,
            expires_at: doc.expires_at,
            account: doc.account,
        }
    }
}

impl TokenState {
    pub fn is_connected(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Parameters for `POST /tracks`.
#[derive(Debug, Clone, Default)]
pub struct UploadTrackParams {
    pub filepath: std::path::PathBuf,
    pub title: String,
    pub downloadable: Option<bool>,
    pub streamable: Option<bool>,
    pub genre: Option<String>,
    pub tag_list: Vec<String>,
    pub description: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
}

/// Parameters for `POST /playlists`. Playlists are created as private EPs.
#[derive(Debug, Clone, Default)]
pub struct CreatePlaylistParams {
    pub title: String,
    pub description: Option<String>,
    pub tag_list: Vec<String>,
    pub track_ids: Vec<u64>,
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Durable home of the token document.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the document stored under `key`, `None` if we never connected.
    async fn load(&self, key: &str) -> Result<Option<TokenDocument>, SoundCloudError>;

    /// Insert or replace the document stored under `key`.
    async fn upsert(&self, key: &str, doc: &TokenDocument) -> Result<(), SoundCloudError>;
}
