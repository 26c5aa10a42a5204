// This is the entry point of the label operations bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, APIs)
// - `discord/` = Discord-specific adapters (slash commands)
// - `web/` = Inbound HTTP (SoundCloud OAuth redirect, Drive push notifications)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the web server and the Drive sweep
// 4. Set up the Discord framework and run until Ctrl-C

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "web/web_layer.rs"]
mod web;

use std::sync::Arc;

use crate::config::BotConfig;
use crate::core::drive::{ChangeFeedWatcher, DriveSyncService, DriveSyncSettings, StopWatchOutcome};
use crate::core::soundcloud::OAuthStateRegistry;
use crate::discord::{Data, Error};
use crate::infra::google_drive::{GoogleDriveClient, ServiceAccountAuth};
use crate::infra::soundcloud::{SoundCloudClient, SoundCloudConfig, SqliteTokenStore};
use poise::serenity_prelude as serenity;

/// Build the Drive sync service, or `None` when no service account is configured.
async fn build_drive(config: &BotConfig) -> Option<Arc<DriveSyncService<GoogleDriveClient>>> {
    let auth = match ServiceAccountAuth::from_env().await {
        Ok(Some(auth)) => auth,
        Ok(None) => {
            tracing::info!("No Google service account configured, Drive sync disabled");
            return None;
        }
        Err(e) => {
            tracing::error!("Failed to load Google service account, Drive sync disabled: {}", e);
            return None;
        }
    };
    tracing::info!("Drive sync running as {}", auth.client_email());

    let renew_margin = chrono::Duration::from_std(config.drive_renew_margin)
        .unwrap_or_else(|_| chrono::Duration::minutes(5));
    let settings = DriveSyncSettings {
        webhook_address: config.drive_webhook_address(),
        renew_margin,
    };

    let api = GoogleDriveClient::new(Arc::new(auth));
    Some(Arc::new(DriveSyncService::new(
        ChangeFeedWatcher::new(api),
        settings,
    )))
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = BotConfig::from_env().expect("Invalid configuration! Check your .env file.");

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    std::fs::create_dir_all(&config.data_dir)
        .expect("Failed to create data directory for SQLite files");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let token_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!(
            "sqlite://{}?mode=rwc",
            config.soundcloud_db_path().display()
        ))
        .await
        .expect("Failed to connect to SoundCloud token DB");
    let token_store = SqliteTokenStore::new(token_pool);
    token_store
        .migrate()
        .await
        .expect("Failed to migrate SoundCloud token DB");

    let soundcloud = Arc::new(SoundCloudClient::new(
        SoundCloudConfig::new(
            config.soundcloud_client_id.clone(),
            config.soundcloud_client_secret.clone(),
            config.soundcloud_redirect_uri(),
        ),
        token_store,
    ));
    match soundcloud.hydrate().await {
        Ok(true) => tracing::info!("Loaded stored SoundCloud credentials"),
        Ok(false) => tracing::info!("SoundCloud not connected yet, use /sc connect"),
        Err(e) => tracing::error!("Failed to load SoundCloud credentials: {}", e),
    }

    let drive = build_drive(&config).await;
    if let Some(drive) = &drive {
        match drive.ensure_watching().await {
            Ok(Some(channel)) => {
                tracing::info!(channel_id = %channel.channel_id, "Drive watch started")
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Failed to start Drive watch, sweeps will retry: {}", e),
        }
    }

    let data = Data {
        soundcloud,
        oauth_states: Arc::new(OAuthStateRegistry::new()),
        drive,
    };

    // ========================================================================
    // BACKGROUND TASKS
    // ========================================================================

    let router = web::router(data.clone());
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = web::serve(router, port).await {
            tracing::error!("Web server stopped: {}", e);
        }
    });

    // Scheduled drain + renewal check, the fallback for lost notifications.
    if let Some(drive) = data.drive.clone() {
        let interval = config.drive_sweep_interval;
        tokio::spawn(async move {
            use tokio::time::sleep;

            loop {
                sleep(interval).await;
                tracing::debug!("Starting Drive sweep...");
                match drive.sweep().await {
                    Ok(report) => {
                        if !report.changes.is_empty() {
                            tracing::info!("Drive sweep found {} changes", report.changes.len());
                        }
                    }
                    Err(err) => tracing::warn!("Drive sweep failed: {}", err),
                }
            }
        });
    }

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS;
    let setup_data = data.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands::all(),
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                tracing::info!("Commands registered, bot is ready");
                Ok::<Data, Error>(setup_data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                tracing::error!("Discord client stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down");
        }
    }

    if let Some(drive) = &data.drive {
        match drive.shutdown().await {
            StopWatchOutcome::Stopped(channel) => {
                tracing::info!(channel_id = %channel.channel_id, "Drive watch stopped")
            }
            StopWatchOutcome::RemoteFailed(channel, e) => tracing::warn!(
                channel_id = %channel.channel_id,
                "Drive watch stop failed, it will expire on its own: {}",
                e
            ),
            StopWatchOutcome::NoSubscription => {}
        }
    }
}
