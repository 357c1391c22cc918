// File: chatbridge-common/src/models/platform.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// The two live-chat sources the bridge knows about.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(rename = "tiktok")]
    TikTok,
    Twitch,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::TikTok, Platform::Twitch];

    /// Fixed accent color used whenever the platform supplies none.
    pub fn accent_color(&self) -> &'static str {
        match self {
            Platform::TikTok => "#ff0050",
            Platform::Twitch => "#9146FF",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::TikTok => write!(f, "tiktok"),
            Platform::Twitch => write!(f, "twitch"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiktok" => Ok(Platform::TikTok),
            "twitch" => Ok(Platform::Twitch),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}
