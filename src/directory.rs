use async_trait::async_trait;
use poise::serenity_prelude as serenity;

use crate::lifecycle::{ChannelDirectory, ChannelState, DirectoryError};

/// `ChannelDirectory` backed by the live serenity context. Occupancy comes
/// from the gateway voice-state cache, everything else goes over HTTP.
pub struct SerenityDirectory {
    ctx: serenity::Context,
}

impl SerenityDirectory {
    pub fn new(ctx: serenity::Context) -> Self {
        Self { ctx }
    }

    fn snapshot(&self, channel: &serenity::GuildChannel) -> ChannelState {
        let occupants = channel
            .members(&self.ctx)
            .map(|members| members.len())
            .unwrap_or(0);
        ChannelState {
            id: channel.id.get(),
            name: channel.name.clone(),
            category_id: channel.parent_id.map(|id| id.get()),
            occupants,
        }
    }
}

fn classify(err: serenity::Error) -> DirectoryError {
    if let serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(ref response)) = err {
        match response.status_code.as_u16() {
            403 => return DirectoryError::PermissionDenied(err.to_string()),
            404 => return DirectoryError::NotFound,
            _ => {}
        }
    }
    DirectoryError::Transient(err.to_string())
}

#[async_trait]
impl ChannelDirectory for SerenityDirectory {
    async fn create_voice_channel(
        &self,
        guild_id: u64,
        name: &str,
        category_id: u64,
    ) -> Result<u64, DirectoryError> {
        let channel = serenity::GuildId::new(guild_id)
            .create_channel(
                &self.ctx,
                serenity::CreateChannel::new(name)
                    .kind(serenity::ChannelType::Voice)
                    .category(serenity::ChannelId::new(category_id)),
            )
            .await
            .map_err(classify)?;
        Ok(channel.id.get())
    }

    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelState, DirectoryError> {
        let channel = serenity::ChannelId::new(channel_id)
            .to_channel(&self.ctx)
            .await
            .map_err(classify)?;
        let Some(guild_channel) = channel.guild() else {
            return Err(DirectoryError::NotFound);
        };
        if guild_channel.kind != serenity::ChannelType::Voice {
            return Err(DirectoryError::NotFound);
        }
        Ok(self.snapshot(&guild_channel))
    }

    async fn delete_channel(&self, channel_id: u64, reason: &str) -> Result<(), DirectoryError> {
        self.ctx
            .http
            .delete_channel(serenity::ChannelId::new(channel_id), Some(reason))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn list_channels_in_category(
        &self,
        guild_id: u64,
        category_id: u64,
    ) -> Result<Vec<ChannelState>, DirectoryError> {
        let channels = serenity::GuildId::new(guild_id)
            .channels(&self.ctx)
            .await
            .map_err(classify)?;
        Ok(channels
            .values()
            .filter(|channel| {
                channel.kind == serenity::ChannelType::Voice
                    && channel.parent_id.map(|id| id.get()) == Some(category_id)
            })
            .map(|channel| self.snapshot(channel))
            .collect())
    }

    async fn move_member(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    ) -> Result<(), DirectoryError> {
        serenity::GuildId::new(guild_id)
            .move_member(
                &self.ctx,
                serenity::UserId::new(user_id),
                serenity::ChannelId::new(channel_id),
            )
            .await
            .map_err(classify)?;
        Ok(())
    }
}
