// Change feed consumer for Google Drive.
//
// The watcher owns two pieces of state: the page cursor ("everything before
// this has been seen") and the active push subscription. Drains are
// collect-then-commit: every page is fetched before the cursor moves, so a
// failed page fetch leaves the committed cursor where it was.
//
// NO HTTP dependencies here - the REST calls go through `DriveChangesApi`.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::drive_models::{
    ChangeFeedState, ChangePage, DriveError, StopWatchOutcome, SyncResult, WatchChannel,
    WatchRequest,
};

/// The Drive change feed calls the watcher needs.
#[async_trait]
pub trait DriveChangesApi: Send + Sync {
    /// `changes.getStartPageToken`. `None` when Drive leaves the field out.
    async fn get_start_page_token(&self) -> Result<Option<String>, DriveError>;

    /// `changes.list` for a single page.
    async fn list_changes(&self, page_token: &str) -> Result<ChangePage, DriveError>;

    /// `changes.watch`, starting at `page_token`.
    async fn watch_changes(
        &self,
        page_token: &str,
        request: &WatchRequest,
    ) -> Result<WatchChannel, DriveError>;

    /// `channels.stop`.
    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<(), DriveError>;
}

pub struct ChangeFeedWatcher<C: DriveChangesApi> {
    api: C,
    state: RwLock<ChangeFeedState>,
    /// Serializes drains and cursor resets. Notifications that arrive mid-drain
    /// wait here and drain again afterwards.
    drain_lock: Mutex<()>,
    /// Serializes every change to the subscription. Held across the remote
    /// calls so a channel is never started or stopped against a stale read.
    watch_lock: Mutex<()>,
}

impl<C: DriveChangesApi> ChangeFeedWatcher<C> {
    pub fn new(api: C) -> Self {
        Self {
            api,
            state: RwLock::new(ChangeFeedState::default()),
            drain_lock: Mutex::new(()),
            watch_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn api(&self) -> &C {
        &self.api
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> ChangeFeedState {
        self.state.read().await.clone()
    }

    pub async fn page_token(&self) -> Option<String> {
        self.state.read().await.page_token.clone()
    }

    pub async fn subscription(&self) -> Option<WatchChannel> {
        self.state.read().await.subscription.clone()
    }

    /// Ask Drive for a fresh cursor.
    pub async fn get_start_page_token(&self) -> Result<String, DriveError> {
        self.api
            .get_start_page_token()
            .await?
            .filter(|token| !token.is_empty())
            .ok_or(DriveError::MissingStartPageToken)
    }

    /// Reset the cursor to `initial_token`, or to a fresh start token.
    ///
    /// Always overwrites the current cursor. Waits for an in-flight drain first.
    pub async fn init_watch(&self, initial_token: Option<String>) -> Result<String, DriveError> {
        let _guard = self.drain_lock.lock().await;

        let token = match initial_token {
            Some(token) => token,
            None => self.get_start_page_token().await?,
        };

        self.state.write().await.page_token = Some(token.clone());
        tracing::info!(page_token = %token, "Drive change cursor initialized");
        Ok(token)
    }

    /// Register a new push subscription delivering to `webhook_address`.
    ///
    /// Overwrites the local subscription without stopping the old channel,
    /// use `replace_watch` when one may already be live.
    pub async fn start_watch(&self, webhook_address: &str) -> Result<WatchChannel, DriveError> {
        let _guard = self.watch_lock.lock().await;
        if let Some(previous) = self.subscription().await {
            tracing::warn!(
                channel_id = %previous.channel_id,
                "Starting a Drive watch over a live one, the old channel is left to expire"
            );
        }
        self.start_watch_locked(webhook_address).await
    }

    /// Start a new subscription, then stop the one it replaces.
    ///
    /// The old channel is stopped only after the new one is live so there is
    /// no window without notifications. Stopping it is best-effort.
    pub async fn replace_watch(&self, webhook_address: &str) -> Result<WatchChannel, DriveError> {
        let _guard = self.watch_lock.lock().await;
        self.replace_watch_locked(webhook_address).await
    }

    /// `replace_watch`, but only when `should_replace` agrees with the
    /// subscription as it stands once no other start, stop or renewal is running.
    pub async fn replace_watch_if<F>(
        &self,
        webhook_address: &str,
        should_replace: F,
    ) -> Result<Option<WatchChannel>, DriveError>
    where
        F: FnOnce(Option<&WatchChannel>) -> bool,
    {
        let _guard = self.watch_lock.lock().await;
        let current = self.subscription().await;
        if !should_replace(current.as_ref()) {
            return Ok(None);
        }
        self.replace_watch_locked(webhook_address).await.map(Some)
    }

    async fn replace_watch_locked(&self, webhook_address: &str) -> Result<WatchChannel, DriveError> {
        let previous = self.subscription().await;
        let channel = self.start_watch_locked(webhook_address).await?;

        if let Some(previous) = previous.filter(|p| p.channel_id != channel.channel_id) {
            if let Err(err) = self
                .api
                .stop_channel(&previous.channel_id, &previous.resource_id)
                .await
            {
                tracing::warn!(
                    channel_id = %previous.channel_id,
                    "Failed to stop replaced Drive channel: {}",
                    err
                );
            }
        }
        Ok(channel)
    }

    async fn start_watch_locked(&self, webhook_address: &str) -> Result<WatchChannel, DriveError> {
        if self.page_token().await.is_none() {
            self.init_watch(None).await?;
        }
        let page_token = self.page_token().await.ok_or(DriveError::NoCursor)?;

        let request = WatchRequest::web_hook(Uuid::new_v4().to_string(), webhook_address);
        let channel = self.api.watch_changes(&page_token, &request).await?;

        self.state.write().await.subscription = Some(channel.clone());
        tracing::info!(
            channel_id = %channel.channel_id,
            resource_id = %channel.resource_id,
            expiration = ?channel.expiration,
            "Drive watch started"
        );
        Ok(channel)
    }

    /// Cancel the active subscription, if any.
    ///
    /// Remote cancellation is advisory: its failure is reported in the outcome
    /// and logged, and the local subscription is dropped either way.
    pub async fn stop_watch(&self) -> StopWatchOutcome {
        let _guard = self.watch_lock.lock().await;
        let Some(channel) = self.subscription().await else {
            return StopWatchOutcome::NoSubscription;
        };

        let result = self
            .api
            .stop_channel(&channel.channel_id, &channel.resource_id)
            .await;

        {
            let mut state = self.state.write().await;
            if state.channel_id() == Some(channel.channel_id.as_str()) {
                state.subscription = None;
            }
        }

        match result {
            Ok(()) => {
                tracing::info!(channel_id = %channel.channel_id, "Drive watch stopped");
                StopWatchOutcome::Stopped(channel)
            }
            Err(err) => {
                tracing::warn!(
                    channel_id = %channel.channel_id,
                    "Failed to stop Drive watch remotely: {}",
                    err
                );
                StopWatchOutcome::RemoteFailed(channel, err)
            }
        }
    }

    /// Drain every pending change since the committed cursor.
    ///
    /// The cursor is committed only after the last page was fetched. Any error
    /// propagates and leaves the committed cursor untouched.
    pub async fn sync_changes(&self) -> Result<SyncResult, DriveError> {
        let _guard = self.drain_lock.lock().await;

        let mut token = self.page_token().await.ok_or(DriveError::NoCursor)?;
        let mut changes = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = self.api.list_changes(&token).await?;
            pages += 1;
            tracing::debug!(
                page_token = %token,
                changes = page.changes.len(),
                "Fetched Drive change page"
            );
            changes.extend(page.changes);

            match (page.next_page_token, page.new_start_page_token) {
                (Some(next), _) => {
                    if next == token {
                        return Err(DriveError::CursorStalled(next));
                    }
                    token = next;
                }
                (None, Some(new_start)) => {
                    token = new_start;
                    break;
                }
                (None, None) => break,
            }
        }

        self.state.write().await.page_token = Some(token.clone());
        tracing::info!(
            pages,
            changes = changes.len(),
            page_token = %token,
            "Drive changes synced"
        );

        Ok(SyncResult {
            page_token: token,
            changes,
        })
    }

    /// Milliseconds until the subscription lapses, `None` without one.
    pub async fn channel_expires_in_ms(&self) -> Option<i64> {
        expires_in_ms(self.subscription().await.as_ref()?)
    }
}

/// Milliseconds until `channel` lapses, `None` when Drive gave no expiration.
pub fn expires_in_ms(channel: &WatchChannel) -> Option<i64> {
    Some(channel.expiration? - Utc::now().timestamp_millis())
}
