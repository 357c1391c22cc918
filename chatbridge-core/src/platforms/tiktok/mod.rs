pub mod runtime;

pub use runtime::{parse_relay_frame, RelayFrame, TikTokChatData, TikTokRelayAdapter, TikTokRelayConnection};
pub(crate) use runtime::to_chat_event;
