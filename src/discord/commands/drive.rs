// `/drive` commands for inspecting and steering the change feed subscription.

use std::sync::Arc;

use poise::serenity_prelude as serenity;

use super::{Context, DriveSync, Error};
use crate::core::drive::StopWatchOutcome;

const DISABLED: &str = "Drive sync is disabled (no Google service account configured).";

/// Root `/drive` command.
#[poise::command(
    slash_command,
    guild_only,
    subcommands("status", "watch", "stop")
)]
pub async fn drive(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "Drive sync commands:\n\
        `/drive status` - Show the cursor and the active subscription\n\
        `/drive watch` - Start or renew the push subscription (admins only)\n\
        `/drive stop` - Stop the push subscription (admins only)",
    )
    .await?;
    Ok(())
}

fn drive_service(ctx: &Context<'_>) -> Option<Arc<DriveSync>> {
    ctx.data().drive.clone()
}

/// Show the change feed cursor and the active subscription.
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let Some(drive) = drive_service(&ctx) else {
        ctx.say(DISABLED).await?;
        return Ok(());
    };

    let state = drive.watcher().state().await;
    let expires_in = drive.watcher().channel_expires_in_ms().await;

    let cursor = if state.page_token.is_some() {
        "initialized"
    } else {
        "not initialized"
    };
    let channel = state
        .channel_id()
        .map(|id| format!("`{id}`"))
        .unwrap_or_else(|| "none".to_string());
    let expiry = match expires_in {
        Some(ms) if ms > 0 => format!("in {} min", ms / 60_000),
        Some(_) => "expired".to_string(),
        None if state.subscription.is_some() => "unknown".to_string(),
        None => "-".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title("Drive change feed")
        .field("Cursor", cursor, true)
        .field("Channel", channel, true)
        .field("Expires", expiry, true)
        .color(serenity::Colour::from_rgb(66, 133, 244));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Start or renew the push subscription.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn watch(ctx: Context<'_>) -> Result<(), Error> {
    let Some(drive) = drive_service(&ctx) else {
        ctx.say(DISABLED).await?;
        return Ok(());
    };
    ctx.defer().await?;

    match drive.renew().await {
        Ok(channel) => {
            ctx.say(format!("Watching Drive changes on channel `{}`.", channel.channel_id))
                .await?;
        }
        Err(err) => {
            tracing::error!("Manual Drive watch failed: {}", err);
            ctx.say(format!("Could not start the Drive watch: {err}")).await?;
        }
    }
    Ok(())
}

/// Stop the push subscription. Scheduled sweeps keep draining the feed.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    let Some(drive) = drive_service(&ctx) else {
        ctx.say(DISABLED).await?;
        return Ok(());
    };
    ctx.defer().await?;

    let reply = match drive.shutdown().await {
        StopWatchOutcome::NoSubscription => "There is no active Drive watch.".to_string(),
        StopWatchOutcome::Stopped(channel) => {
            format!("Stopped Drive watch `{}`.", channel.channel_id)
        }
        StopWatchOutcome::RemoteFailed(channel, err) => format!(
            "Forgot Drive watch `{}`, but Google did not confirm the stop ({err}). It will expire on its own.",
            channel.channel_id
        ),
    };

    ctx.say(reply).await?;
    Ok(())
}
