use poise::{serenity_prelude as serenity, CreateReply};

use crate::{Context, Error};

pub async fn reply_embed(ctx: Context<'_>, embed: serenity::CreateEmbed) -> Result<(), Error> {
    ctx.send(
        CreateReply::default()
            .embed(embed)
            .reply(true)
            .allowed_mentions(serenity::CreateAllowedMentions::default().replied_user(false)),
    )
    .await?;
    Ok(())
}

pub async fn reply_error(ctx: Context<'_>, title: &str, description: &str) -> Result<(), Error> {
    reply_embed(
        ctx,
        serenity::CreateEmbed::default()
            .title(title)
            .description(description)
            .color(serenity::Color::RED),
    )
    .await
}
