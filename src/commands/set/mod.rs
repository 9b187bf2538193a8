use crate::{Context, Error};

pub mod voice_hub;

#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    subcommand_required,
    subcommands("voice_hub::voice_hub")
)]
pub async fn set(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}
