// File: chatbridge-common/src/models/viewer.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::chat::ChatEvent;
use crate::models::config::Configuration;

/// Identifies one connected display client.
pub type ViewerId = Uuid;

/// Everything a viewer can receive. Serialized as
/// `{"event": "<kind>", "data": <payload>}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ViewerMessage {
    /// Sent once, right after the viewer joins.
    InitialState(Configuration),
    /// Sent to everyone on every configuration write.
    ConfigUpdate(Configuration),
    Chat(ChatEvent),
}

impl ViewerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ViewerMessage::InitialState(_) => "initial_state",
            ViewerMessage::ConfigUpdate(_) => "config_update",
            ViewerMessage::Chat(_) => "chat",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
