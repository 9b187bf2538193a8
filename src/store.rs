use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::lifecycle::RegistryStore;
use crate::models::config::HubSettings;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PersistedState {
    temp_voice_channels: BTreeSet<u64>,
    voice_hub: Option<HubSettings>,
    // message id -> emoji -> role id, string keys for the JSON object form
    reaction_roles: HashMap<String, HashMap<String, u64>>,
}

/// Single JSON state file, rewritten in full after every mutation. Writes go
/// through a sibling temp file and a rename so a crash mid-write never leaves
/// a half-serialized state behind.
pub struct JsonStateStore {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl JsonStateStore {
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        "state file {} is unreadable, starting fresh: {}",
                        path.display(),
                        e
                    );
                    PersistedState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let store = Self {
            path,
            state: Mutex::new(state),
        };
        {
            let state = store.state.lock().await;
            store.persist(&state).await?;
        }
        Ok(store)
    }

    pub async fn hub_settings(&self) -> Option<HubSettings> {
        self.state.lock().await.voice_hub.clone()
    }

    pub async fn set_hub_settings(&self, settings: HubSettings) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.voice_hub = Some(settings);
        self.persist(&state).await
    }

    pub async fn reaction_role(&self, message_id: u64, emoji: &str) -> Option<u64> {
        let state = self.state.lock().await;
        state
            .reaction_roles
            .get(&message_id.to_string())?
            .get(emoji)
            .copied()
    }

    pub async fn bind_reaction_role(
        &self,
        message_id: u64,
        emoji: &str,
        role_id: u64,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state
            .reaction_roles
            .entry(message_id.to_string())
            .or_default()
            .insert(emoji.to_string(), role_id);
        self.persist(&state).await
    }

    async fn persist(&self, state: &PersistedState) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, text)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for JsonStateStore {
    async fn load(&self) -> anyhow::Result<BTreeSet<u64>> {
        Ok(self.state.lock().await.temp_voice_channels.clone())
    }

    async fn save(&self, channels: &BTreeSet<u64>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.temp_voice_channels = channels.clone();
        self.persist(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_starts_empty_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = JsonStateStore::open(&path).await.unwrap();

        assert!(store.load().await.unwrap().is_empty());
        assert!(store.hub_settings().await.is_none());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = JsonStateStore::open(&path).await.unwrap();
        store.save(&BTreeSet::from([3, 7])).await.unwrap();
        drop(store);

        let store = JsonStateStore::open(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), BTreeSet::from([3, 7]));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn hub_settings_and_reaction_roles_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let settings = HubSettings {
            guild_id: 1,
            hub_channel_id: 10,
            category_id: 20,
        };

        let store = JsonStateStore::open(&path).await.unwrap();
        store.set_hub_settings(settings.clone()).await.unwrap();
        store.bind_reaction_role(500, "✅", 900).await.unwrap();
        drop(store);

        let store = JsonStateStore::open(&path).await.unwrap();
        assert_eq!(store.hub_settings().await, Some(settings));
        assert_eq!(store.reaction_role(500, "✅").await, Some(900));
        assert_eq!(store.reaction_role(500, "❌").await, None);
        assert_eq!(store.reaction_role(501, "✅").await, None);
    }

    #[tokio::test]
    async fn corrupt_file_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = JsonStateStore::open(&path).await.unwrap();

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_keys_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, r#"{"temp_voice_channels":[4],"msg_count":{"1":2}}"#)
            .await
            .unwrap();

        let store = JsonStateStore::open(&path).await.unwrap();

        assert_eq!(store.load().await.unwrap(), BTreeSet::from([4]));
    }
}
