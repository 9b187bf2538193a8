use poise::serenity_prelude::{self as serenity};

use crate::models::config::HubSettings;
use crate::utils::{reply_embed, reply_error};
use crate::{Context, Error};

/// Designate the voice channel whose entry spawns private temp channels.
#[tracing::instrument(name = "command set voice_hub", skip(ctx))]
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_CHANNELS",
    required_bot_permissions = "MANAGE_CHANNELS | MOVE_MEMBERS",
    default_member_permissions = "MANAGE_CHANNELS | MOVE_MEMBERS"
)]
pub async fn voice_hub(
    ctx: Context<'_>,
    #[channel_types("Voice")] channel: serenity::Channel,
) -> Result<(), Error> {
    let Some(guild_channel) = channel.guild() else {
        return Ok(());
    };
    if guild_channel.kind != serenity::ChannelType::Voice {
        return reply_error(ctx, "Not a voice channel", "The hub has to be a voice channel.")
            .await;
    }
    let Some(category_id) = guild_channel.parent_id else {
        return reply_error(
            ctx,
            "No category",
            "That channel has no category I can see, so I would have nowhere to put the rooms.",
        )
        .await;
    };

    let settings = HubSettings {
        guild_id: guild_channel.guild_id.get(),
        hub_channel_id: guild_channel.id.get(),
        category_id: category_id.get(),
    };
    ctx.data().store.set_hub_settings(settings.clone()).await?;
    ctx.data().manager.set_hub(settings).await;

    reply_embed(
        ctx,
        serenity::CreateEmbed::default()
            .title("Hub set")
            .description(format!(
                "{} now spawns a private room for everyone who joins it",
                guild_channel.name,
            ))
            .color(serenity::Color::ORANGE),
    )
    .await
}
