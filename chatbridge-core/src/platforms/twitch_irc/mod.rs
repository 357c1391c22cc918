pub mod client;
pub mod runtime;

pub use client::{ParsedTwitchMsg, TwitchIrcClient};
pub use runtime::{irc_channel_name, TwitchChatMessage, TwitchIrcAdapter, TwitchIrcConnection};
pub(crate) use runtime::to_chat_event;
