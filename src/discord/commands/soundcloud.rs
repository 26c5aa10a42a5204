// `/sc` commands. Thin: issue a state token, call the client, format the reply.

use poise::serenity_prelude as serenity;

use super::{Context, Error};
use crate::core::soundcloud::SoundCloudUser;

/// Root `/sc` command.
#[poise::command(slash_command, guild_only, subcommands("connect", "me"))]
pub async fn sc(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "SoundCloud commands:\n\
        `/sc connect` - Link the label's SoundCloud account (admins only)\n\
        `/sc me` - Show the connected account",
    )
    .await?;
    Ok(())
}

/// Link the label's SoundCloud account.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn connect(ctx: Context<'_>) -> Result<(), Error> {
    let state = ctx.data().oauth_states.issue();
    let url = ctx.data().soundcloud.build_auth_url(Some(&state));

    tracing::info!(user_id = ctx.author().id.get(), "Issued SoundCloud connect link");

    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "Open this link to connect SoundCloud (valid for 10 minutes):\n{url}"
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show the connected SoundCloud account.
#[poise::command(slash_command, guild_only)]
pub async fn me(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    match ctx.data().soundcloud.get_me().await {
        Ok(user) => {
            ctx.send(poise::CreateReply::default().embed(account_embed(&user)))
                .await?;
        }
        Err(err) => {
            tracing::warn!("/sc me failed: {}", err);
            ctx.say(err.user_message()).await?;
        }
    }
    Ok(())
}

fn account_embed(user: &SoundCloudUser) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(format!("SoundCloud: {}", user.username))
        .field("User ID", user.id.to_string(), true)
        .color(serenity::Colour::from_rgb(255, 85, 0));

    if let Some(url) = &user.permalink_url {
        embed = embed.url(url);
    }
    if let Some(avatar) = &user.avatar_url {
        embed = embed.thumbnail(avatar);
    }
    embed
}
