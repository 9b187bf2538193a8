use poise::serenity_prelude::{self as serenity};

use crate::utils::{reply_embed, reply_error};
use crate::{Context, Error};

/// Bind an emoji on the latest message in this channel to a role.
///
/// Reacting with it grants the role, removing the reaction revokes it.
#[tracing::instrument(name = "command role_panel", skip(ctx))]
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    required_bot_permissions = "MANAGE_ROLES",
    default_member_permissions = "MANAGE_ROLES"
)]
pub async fn role_panel(
    ctx: Context<'_>,
    #[description = "e.g. ✅ or <:name:id>"] emoji: String,
    #[description = "Role to hand out"] role: serenity::Role,
) -> Result<(), Error> {
    let messages = ctx
        .channel_id()
        .messages(ctx.http(), serenity::GetMessages::new().limit(1))
        .await?;
    let Some(message) = messages.into_iter().next() else {
        return reply_error(ctx, "No message", "There is no message in this channel to attach to.")
            .await;
    };

    let reaction = match serenity::ReactionType::try_from(emoji.as_str()) {
        Ok(reaction) => reaction,
        Err(_) => {
            return reply_error(ctx, "Bad emoji", "I can't parse that as an emoji.").await;
        }
    };
    message.react(ctx.serenity_context(), reaction).await?;

    ctx.data()
        .store
        .bind_reaction_role(message.id.get(), &emoji, role.id.get())
        .await?;

    reply_embed(
        ctx,
        serenity::CreateEmbed::default()
            .title("Role panel updated")
            .description(format!("{} now hands out {}", emoji, role.name))
            .color(serenity::Color::ORANGE),
    )
    .await
}
