pub mod chat;
pub mod config;
pub mod platform;
pub mod viewer;

pub use chat::{derive_user_color, ChatEvent};
pub use config::{is_configured, ChatAlign, ConfigUpdate, Configuration, NONE_SENTINEL};
pub use platform::Platform;
pub use viewer::{ViewerId, ViewerMessage};
