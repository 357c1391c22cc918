// File: src/platforms/mod.rs

use async_trait::async_trait;
use tokio::sync::mpsc;

use chatbridge_common::models::{ChatEvent, Platform};
use crate::Error;

pub mod supervisor;
pub mod tiktok;
pub mod twitch_irc;

pub use tiktok::{TikTokChatData, TikTokRelayAdapter};
pub use twitch_irc::{TwitchChatMessage, TwitchIrcAdapter};

/// Platform-native chat message, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawChatMessage {
    TikTok(TikTokChatData),
    Twitch(TwitchChatMessage),
}

impl RawChatMessage {
    pub fn platform(&self) -> Platform {
        match self {
            RawChatMessage::TikTok(_) => Platform::TikTok,
            RawChatMessage::Twitch(_) => Platform::Twitch,
        }
    }

    /// Maps into the shared schema, stamping `theme`. Missing user or text is
    /// a `MalformedEvent`.
    pub fn normalize(self, theme: &str) -> Result<ChatEvent, Error> {
        match self {
            RawChatMessage::TikTok(data) => tiktok::to_chat_event(data, theme),
            RawChatMessage::Twitch(msg) => twitch_irc::to_chat_event(msg, theme),
        }
    }
}

/// Lives as long as one upstream session. Owned by the supervisor.
#[async_trait]
pub trait PlatformConnection: Send {
    fn platform(&self) -> Platform;

    fn identity(&self) -> &str;

    /// Hands out the raw message stream. Only the first call returns `Some`.
    fn take_events(&mut self) -> Option<mpsc::Receiver<RawChatMessage>>;

    /// Closes the upstream session. Calling it on an already-closed
    /// connection is not an error.
    async fn disconnect(&mut self) -> Result<(), Error>;
}

/// Opens connections for one platform kind.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn connect(&self, identity: &str) -> Result<Box<dyn PlatformConnection>, Error>;
}

/// Buffer between an upstream reader and the supervisor's pump task.
pub(crate) const RAW_EVENT_BUFFER: usize = 1000;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
