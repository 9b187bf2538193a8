use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSettings {
    pub guild_id: u64,
    pub hub_channel_id: u64,
    pub category_id: u64,
}
