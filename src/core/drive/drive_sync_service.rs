use chrono::Duration;

use super::change_feed_watcher::{expires_in_ms, ChangeFeedWatcher, DriveChangesApi};
use super::drive_models::{
    DriveChange, DriveError, DriveNotification, StopWatchOutcome, WatchChannel,
};

/// Runtime knobs for the sync service.
#[derive(Debug, Clone)]
pub struct DriveSyncSettings {
    /// Public URL Drive posts notifications to. `None` disables watching,
    /// drains then only happen on the scheduled sweep.
    pub webhook_address: Option<String>,
    /// Renew the subscription once it has less than this left.
    pub renew_margin: Duration,
}

impl Default for DriveSyncSettings {
    fn default() -> Self {
        Self {
            webhook_address: None,
            renew_margin: Duration::minutes(5),
        }
    }
}

/// What one notification or sweep did.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Changes to hand to domain logic, in feed order.
    pub changes: Vec<DriveChange>,
    /// Cursor committed by the drain, `None` when no drain ran.
    pub page_token: Option<String>,
    /// New subscription if the renewal check replaced the old one.
    pub renewed: Option<WatchChannel>,
}

/// Glue between inbound notifications, the scheduled sweep and the watcher.
pub struct DriveSyncService<C: DriveChangesApi> {
    watcher: ChangeFeedWatcher<C>,
    settings: DriveSyncSettings,
}

impl<C: DriveChangesApi> DriveSyncService<C> {
    pub fn new(watcher: ChangeFeedWatcher<C>, settings: DriveSyncSettings) -> Self {
        Self { watcher, settings }
    }

    pub fn watcher(&self) -> &ChangeFeedWatcher<C> {
        &self.watcher
    }

    /// Fresh cursor plus a new subscription. Used at start-up.
    pub async fn ensure_watching(&self) -> Result<Option<WatchChannel>, DriveError> {
        self.watcher.init_watch(None).await?;

        match self.settings.webhook_address.as_deref() {
            Some(address) => Ok(Some(self.watcher.start_watch(address).await?)),
            None => {
                tracing::info!("No Drive webhook address configured, relying on sweeps");
                Ok(None)
            }
        }
    }

    /// Handle one push notification.
    pub async fn handle_notification(
        &self,
        notification: &DriveNotification,
    ) -> Result<SyncReport, DriveError> {
        if notification.is_sync_handshake() {
            tracing::debug!(
                channel_id = ?notification.channel_id,
                "Drive watch handshake acknowledged"
            );
            return Ok(SyncReport::default());
        }

        let active = self.watcher.subscription().await;
        let active_id = active.as_ref().map(|c| c.channel_id.as_str());
        if notification.channel_id.is_some() && notification.channel_id.as_deref() != active_id {
            tracing::warn!(
                channel_id = ?notification.channel_id,
                active_channel_id = ?active_id,
                "Notification for a channel we no longer track"
            );
        }

        self.drain_and_renew().await
    }

    /// Scheduled fallback for lost notifications.
    pub async fn sweep(&self) -> Result<SyncReport, DriveError> {
        if self.watcher.page_token().await.is_none() {
            self.watcher.init_watch(None).await?;
        }
        self.drain_and_renew().await
    }

    async fn drain_and_renew(&self) -> Result<SyncReport, DriveError> {
        let result = self.watcher.sync_changes().await?;
        for change in &result.changes {
            log_change(change);
        }

        // A failed renewal must not hide the drained changes, the next
        // notification or sweep tries again.
        let renewed = match self.renew_if_expiring().await {
            Ok(renewed) => renewed,
            Err(err) => {
                tracing::warn!("Drive watch renewal failed: {}", err);
                None
            }
        };

        Ok(SyncReport {
            changes: result.changes,
            page_token: Some(result.page_token),
            renewed,
        })
    }

    /// Replace the subscription when it is missing or about to lapse.
    ///
    /// The check runs against the subscription as it stands once any
    /// concurrent renewal has finished, so overlapping callers renew once.
    pub async fn renew_if_expiring(&self) -> Result<Option<WatchChannel>, DriveError> {
        let Some(address) = self.settings.webhook_address.as_deref() else {
            return Ok(None);
        };

        let margin = self.settings.renew_margin;
        let renewed = self
            .watcher
            .replace_watch_if(address, |current| {
                needs_renewal(current.is_some(), current.and_then(expires_in_ms), margin)
            })
            .await?;

        if let Some(channel) = &renewed {
            tracing::info!(channel_id = %channel.channel_id, "Drive watch renewed");
        }
        Ok(renewed)
    }

    /// Start a new subscription, then retire the previous one.
    pub async fn renew(&self) -> Result<WatchChannel, DriveError> {
        let address = self
            .settings
            .webhook_address
            .as_deref()
            .ok_or(DriveError::NoWebhookAddress)?;

        let channel = self.watcher.replace_watch(address).await?;
        tracing::info!(channel_id = %channel.channel_id, "Drive watch renewed");
        Ok(channel)
    }

    /// Stop the subscription on the way out.
    pub async fn shutdown(&self) -> StopWatchOutcome {
        self.watcher.stop_watch().await
    }
}

/// Hand-off point for downstream processing. Changes may repeat, so whatever
/// runs here has to be idempotent.
fn log_change(change: &DriveChange) {
    match &change.file {
        Some(file) => tracing::info!(
            file_id = ?file.id,
            name = ?file.name,
            mime_type = ?file.mime_type,
            parents = ?file.parents,
            removed = change.removed,
            "Drive change"
        ),
        None => tracing::info!(
            file_id = ?change.file_id,
            removed = change.removed,
            "Drive change without file metadata"
        ),
    }
}

/// Renew when there is no subscription at all or less than `margin` is left.
/// A subscription without an expiration never needs renewing.
fn needs_renewal(has_subscription: bool, remaining_ms: Option<i64>, margin: Duration) -> bool {
    if !has_subscription {
        return true;
    }
    match remaining_ms {
        Some(ms) => ms < margin.num_milliseconds(),
        None => false,
    }
}
