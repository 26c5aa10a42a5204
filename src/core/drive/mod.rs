pub mod change_feed_watcher;
pub mod drive_models;
pub mod drive_sync_service;

pub use change_feed_watcher::{ChangeFeedWatcher, DriveChangesApi};
pub use drive_models::{
    ChangeFeedState, ChangePage, DriveChange, DriveError, DriveFile, DriveNotification,
    StopWatchOutcome, SyncResult, WatchChannel, WatchRequest,
};
pub use drive_sync_service::{DriveSyncService, DriveSyncSettings, SyncReport};
