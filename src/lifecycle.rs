use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::config::HubSettings;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(20);

// Three independent checks, not a chain: late voice state updates are absorbed
// by whichever check fires after the platform caught up.
const EMPTY_CHECK_DELAYS: [(u64, &str); 3] = [
    (0, "temp voice empty immediate"),
    (2, "temp voice empty retry (2s)"),
    (8, "temp voice empty retry (8s)"),
];

const TEMP_NAME_SUFFIX: &str = "'s room";

pub fn temp_channel_name(display_name: &str) -> String {
    format!("{}{}", display_name, TEMP_NAME_SUFFIX)
}

pub fn is_temp_channel_name(name: &str) -> bool {
    name.ends_with(TEMP_NAME_SUFFIX)
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("channel not found")]
    NotFound,
    #[error("missing permission: {0}")]
    PermissionDenied(String),
    #[error("transient platform error: {0}")]
    Transient(String),
}

/// Fresh snapshot of one guild voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub id: u64,
    pub name: String,
    pub category_id: Option<u64>,
    pub occupants: usize,
}

#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn create_voice_channel(
        &self,
        guild_id: u64,
        name: &str,
        category_id: u64,
    ) -> Result<u64, DirectoryError>;
    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelState, DirectoryError>;
    async fn delete_channel(&self, channel_id: u64, reason: &str) -> Result<(), DirectoryError>;
    async fn list_channels_in_category(
        &self,
        guild_id: u64,
        category_id: u64,
    ) -> Result<Vec<ChannelState>, DirectoryError>;
    async fn move_member(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    ) -> Result<(), DirectoryError>;
}

/// Whole-value overwrite of the set of live temp channel ids.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<BTreeSet<u64>>;
    async fn save(&self, channels: &BTreeSet<u64>) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: ChannelDirectory + ?Sized> ChannelDirectory for Arc<T> {
    async fn create_voice_channel(
        &self,
        guild_id: u64,
        name: &str,
        category_id: u64,
    ) -> Result<u64, DirectoryError> {
        (**self).create_voice_channel(guild_id, name, category_id).await
    }

    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelState, DirectoryError> {
        (**self).fetch_channel(channel_id).await
    }

    async fn delete_channel(&self, channel_id: u64, reason: &str) -> Result<(), DirectoryError> {
        (**self).delete_channel(channel_id, reason).await
    }

    async fn list_channels_in_category(
        &self,
        guild_id: u64,
        category_id: u64,
    ) -> Result<Vec<ChannelState>, DirectoryError> {
        (**self).list_channels_in_category(guild_id, category_id).await
    }

    async fn move_member(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
    ) -> Result<(), DirectoryError> {
        (**self).move_member(guild_id, user_id, channel_id).await
    }
}

#[async_trait]
impl<T: RegistryStore + ?Sized> RegistryStore for Arc<T> {
    async fn load(&self) -> anyhow::Result<BTreeSet<u64>> {
        (**self).load().await
    }

    async fn save(&self, channels: &BTreeSet<u64>) -> anyhow::Result<()> {
        (**self).save(channels).await
    }
}

/// Owns creation, tracking and deletion of hub-spawned temp voice channels.
///
/// Voice state events can arrive duplicated, reordered or late, so no single
/// observation is trusted: every deletion decision re-fetches live channel
/// state, and the periodic sweep retries anything a deferred check could not
/// finish.
pub struct TempVoiceManager<D, S> {
    directory: D,
    registry: S,
    hub: RwLock<Option<HubSettings>>,
}

impl<D, S> TempVoiceManager<D, S>
where
    D: ChannelDirectory + 'static,
    S: RegistryStore + 'static,
{
    pub fn new(directory: D, registry: S, hub: Option<HubSettings>) -> Self {
        Self {
            directory,
            registry,
            hub: RwLock::new(hub),
        }
    }

    pub async fn hub_settings(&self) -> Option<HubSettings> {
        self.hub.read().await.clone()
    }

    pub async fn set_hub(&self, settings: HubSettings) {
        *self.hub.write().await = Some(settings);
    }

    /// Provisions a private voice channel for a member who just entered the
    /// hub, registers it and moves the member in. A failed creation registers
    /// nothing; a failed move leaves the channel to the sweep.
    pub async fn member_entered_hub(
        &self,
        user_id: u64,
        display_name: &str,
    ) -> Result<Option<u64>, DirectoryError> {
        let Some(hub) = self.hub.read().await.clone() else {
            return Ok(None);
        };
        let name = temp_channel_name(display_name);
        let channel_id = self
            .directory
            .create_voice_channel(hub.guild_id, &name, hub.category_id)
            .await?;
        self.remember(channel_id).await;
        tracing::info!("created temp voice {}({}) for {}", name, channel_id, display_name);
        if let Err(e) = self
            .directory
            .move_member(hub.guild_id, user_id, channel_id)
            .await
        {
            tracing::warn!("failed to move {} into {}: {}", user_id, channel_id, e);
        }
        Ok(Some(channel_id))
    }

    /// Schedules the deferred delete-if-empty checks for a channel a member
    /// just left, if that channel is plausibly one of ours.
    pub async fn member_left_channel(self: Arc<Self>, channel_id: u64) {
        if !self.is_managed(channel_id).await {
            return;
        }
        for (delay, reason) in EMPTY_CHECK_DELAYS {
            let manager = Arc::clone(&self);
            tokio::spawn(async move {
                if delay > 0 {
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                manager.delete_if_empty(channel_id, reason).await;
            });
        }
    }

    // Registry first; the category + name-pattern match only heals channels
    // that never made it into the registry.
    async fn is_managed(&self, channel_id: u64) -> bool {
        match self.registry.load().await {
            Ok(tracked) if tracked.contains(&channel_id) => return true,
            Ok(_) => {}
            Err(e) => {
                tracing::error!("failed to load temp channel registry: {:?}", e);
                return false;
            }
        }
        let Some(hub) = self.hub.read().await.clone() else {
            return false;
        };
        match self.directory.fetch_channel(channel_id).await {
            Ok(state) => {
                state.category_id == Some(hub.category_id) && is_temp_channel_name(&state.name)
            }
            Err(_) => false,
        }
    }

    /// Deletes the channel if a fresh read finds it empty. A channel that is
    /// already gone is dropped from the registry; a failed delete keeps its
    /// entry so the next sweep retries.
    pub async fn delete_if_empty(&self, channel_id: u64, reason: &str) {
        let state = match self.directory.fetch_channel(channel_id).await {
            Ok(state) => state,
            Err(DirectoryError::NotFound) => {
                self.forget(channel_id).await;
                return;
            }
            Err(e) => {
                tracing::warn!("failed to fetch temp channel {}: {}", channel_id, e);
                return;
            }
        };
        if state.occupants > 0 {
            return;
        }
        match self.directory.delete_channel(channel_id, reason).await {
            Ok(()) | Err(DirectoryError::NotFound) => {
                tracing::info!("{}({}) was empty, deleted: {}", state.name, channel_id, reason);
                self.forget(channel_id).await;
            }
            Err(e) => {
                tracing::error!("failed to delete temp channel {}: {}", channel_id, e);
            }
        }
    }

    /// Full consistency pass: reconciles every registry entry against live
    /// state, then scans the hub category for channels the registry lost
    /// track of. Empty orphans are deleted, occupied ones adopted.
    pub async fn sweep(&self) {
        let tracked = match self.registry.load().await {
            Ok(tracked) => tracked,
            Err(e) => {
                tracing::error!("failed to load temp channel registry: {:?}", e);
                return;
            }
        };
        for channel_id in tracked {
            self.delete_if_empty(channel_id, "temp voice GC cleanup").await;
        }

        let Some(hub) = self.hub.read().await.clone() else {
            return;
        };
        let tracked = self.registry.load().await.unwrap_or_default();
        let channels = match self
            .directory
            .list_channels_in_category(hub.guild_id, hub.category_id)
            .await
        {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!("failed to list hub category channels: {}", e);
                return;
            }
        };
        for channel in channels {
            if channel.id == hub.hub_channel_id
                || tracked.contains(&channel.id)
                || !is_temp_channel_name(&channel.name)
            {
                continue;
            }
            if channel.occupants > 0 {
                tracing::info!("{}({}) is an occupied orphan, adopting", channel.name, channel.id);
                self.remember(channel.id).await;
                continue;
            }
            match self
                .directory
                .delete_channel(channel.id, "temp voice category sweep")
                .await
            {
                Ok(()) | Err(DirectoryError::NotFound) => {
                    tracing::info!("{}({}) deleted by category sweep", channel.name, channel.id);
                }
                Err(e) => {
                    tracing::error!("failed to delete orphaned channel {}: {}", channel.id, e);
                }
            }
        }
    }

    async fn remember(&self, channel_id: u64) {
        match self.registry.load().await {
            Ok(mut tracked) => {
                if tracked.insert(channel_id) {
                    if let Err(e) = self.registry.save(&tracked).await {
                        tracing::error!("failed to persist temp channel registry: {:?}", e);
                    }
                }
            }
            Err(e) => tracing::error!("failed to load temp channel registry: {:?}", e),
        }
    }

    async fn forget(&self, channel_id: u64) {
        match self.registry.load().await {
            Ok(mut tracked) => {
                if tracked.remove(&channel_id) {
                    if let Err(e) = self.registry.save(&tracked).await {
                        tracing::error!("failed to persist temp channel registry: {:?}", e);
                    }
                }
            }
            Err(e) => tracing::error!("failed to load temp channel registry: {:?}", e),
        }
    }
}
