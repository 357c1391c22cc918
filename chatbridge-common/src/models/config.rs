// File: chatbridge-common/src/models/config.rs

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::platform::Platform;

/// Identity value meaning "do not connect this platform".
pub const NONE_SENTINEL: &str = "NONE";

/// True when `identity` names something to connect to.
pub fn is_configured(identity: &str) -> bool {
    !identity.is_empty() && identity != NONE_SENTINEL
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatAlign {
    #[default]
    Left,
    Right,
    Center,
}

/// Process-wide display + connection settings pushed to every viewer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub tiktok_username: String,
    pub twitch_channel: String,
    pub theme: String,
    pub chat_align: ChatAlign,
    /// Seconds before a message fades out; 0 disables fading.
    pub chat_fade: f64,
    pub font_size: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            tiktok_username: String::new(),
            twitch_channel: String::new(),
            theme: "default".to_string(),
            chat_align: ChatAlign::Left,
            chat_fade: 0.0,
            font_size: 16,
        }
    }
}

impl Configuration {
    pub fn identity(&self, platform: Platform) -> &str {
        match platform {
            Platform::TikTok => &self.tiktok_username,
            Platform::Twitch => &self.twitch_channel,
        }
    }

    /// The identity for `platform`, or None if it is empty / the sentinel.
    pub fn configured_identity(&self, platform: Platform) -> Option<&str> {
        let identity = self.identity(platform);
        is_configured(identity).then_some(identity)
    }

    /// Both identity fields, in `Platform::ALL` order.
    pub fn identities(&self) -> (&str, &str) {
        (&self.tiktok_username, &self.twitch_channel)
    }

    pub fn has_any_source(&self) -> bool {
        Platform::ALL.iter().any(|p| self.configured_identity(*p).is_some())
    }

    /// Shallow merge: every field present in `update` overwrites, the rest stay.
    pub fn merged(&self, update: &ConfigUpdate) -> Configuration {
        let mut next = self.clone();
        if let Some(v) = &update.tiktok_username {
            next.tiktok_username = v.clone();
        }
        if let Some(v) = &update.twitch_channel {
            next.twitch_channel = v.clone();
        }
        if let Some(v) = &update.theme {
            next.theme = v.clone();
        }
        if let Some(v) = update.chat_align {
            next.chat_align = v;
        }
        if let Some(v) = update.chat_fade {
            next.chat_fade = v;
        }
        if let Some(v) = update.font_size {
            next.font_size = v;
        }
        next
    }
}

/// Partial configuration as posted by the dashboard; absent fields are kept.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiktok_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitch_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_align: Option<ChatAlign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_fade: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
}

impl ConfigUpdate {
    pub fn identity(platform: Platform, value: impl Into<String>) -> Self {
        let mut update = Self::default();
        match platform {
            Platform::TikTok => update.tiktok_username = Some(value.into()),
            Platform::Twitch => update.twitch_channel = Some(value.into()),
        }
        update
    }

    pub fn theme(value: impl Into<String>) -> Self {
        Self { theme: Some(value.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let Some(fade) = self.chat_fade {
            if !fade.is_finite() || fade < 0.0 {
                return Err(Error::InvalidConfig(format!("chatFade must be >= 0, got {fade}")));
            }
        }
        if self.font_size == Some(0) {
            return Err(Error::InvalidConfig("fontSize must be > 0".into()));
        }
        Ok(())
    }
}
