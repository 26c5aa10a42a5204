use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while talking to the Drive change feed.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Drive API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Drive HTTP transport error: {0}")]
    Http(String),

    #[error("Google authentication failed: {0}")]
    Auth(String),

    #[error("Drive returned no start page token")]
    MissingStartPageToken,

    #[error("Change feed has no cursor, call init_watch first")]
    NoCursor,

    #[error("No Drive webhook address configured")]
    NoWebhookAddress,

    #[error("Drive kept returning the same page token: {0}")]
    CursorStalled(String),
}

/// The subset of a Drive file resource that the bot looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub trashed: Option<bool>,
}

/// One record of the change list. Downstream handlers must be idempotent,
/// the same change can be delivered more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DriveChange {
    #[serde(default)]
    pub change_type: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub file: Option<DriveFile>,
}

/// One page of `changes.list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangePage {
    #[serde(default)]
    pub changes: Vec<DriveChange>,
    /// More pages are pending.
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Feed exhausted, this is where the next drain starts.
    #[serde(default)]
    pub new_start_page_token: Option<String>,
}

/// Body of `changes.watch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
}

impl WatchRequest {
    pub fn web_hook(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "web_hook".to_string(),
            address: address.into(),
        }
    }
}

/// An active push subscription. Channel and resource ids only ever exist
/// together, so they live in one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChannel {
    pub channel_id: String,
    pub resource_id: String,
    /// Epoch milliseconds after which Drive stops delivering notifications.
    pub expiration: Option<i64>,
}

/// Process-local change feed state.
///
/// Held in memory only: a restart keeps nothing, the cursor is re-fetched
/// and the old channel simply runs out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeFeedState {
    pub page_token: Option<String>,
    pub subscription: Option<WatchChannel>,
}

impl ChangeFeedState {
    pub fn channel_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.channel_id.as_str())
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.resource_id.as_str())
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// The cursor committed at the end of the drain.
    pub page_token: String,
    /// Every change of every page, in the order Drive returned them.
    pub changes: Vec<DriveChange>,
}

/// What `stop_watch` managed to do. The local subscription is gone in every case.
#[derive(Debug)]
pub enum StopWatchOutcome {
    NoSubscription,
    Stopped(WatchChannel),
    RemoteFailed(WatchChannel, DriveError),
}

/// Identity headers Drive sends with every push notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriveNotification {
    pub channel_id: Option<String>,
    pub resource_id: Option<String>,
    /// `sync`, `add`, `remove`, `update`, `trash`, `untrash` or `change`.
    pub resource_state: Option<String>,
    pub message_number: Option<u64>,
}

impl DriveNotification {
    /// Build from the `x-goog-*` headers of a push request. `header` looks a
    /// header up by lowercase name.
    pub fn from_headers<F>(header: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            channel_id: header("x-goog-channel-id"),
            resource_id: header("x-goog-resource-id"),
            resource_state: header("x-goog-resource-state"),
            message_number: header("x-goog-message-number").and_then(|n| n.trim().parse().ok()),
        }
    }

    /// The handshake Drive sends right after a channel is created.
    pub fn is_sync_handshake(&self) -> bool {
        self.resource_state.as_deref() == Some("sync")
    }
}
