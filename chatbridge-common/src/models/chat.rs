// File: chatbridge-common/src/models/chat.rs

use serde::{Deserialize, Serialize};

use crate::models::platform::Platform;

/// One normalized chat line, ready to be fanned out to viewers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatEvent {
    pub platform: Platform,
    pub user: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Theme in effect when the event was emitted.
    pub theme: String,
}

impl ChatEvent {
    /// Native color if the platform gave one, otherwise derived from the user name.
    pub fn display_color(&self) -> String {
        match &self.color {
            Some(c) if !c.is_empty() => c.clone(),
            _ => derive_user_color(&self.user),
        }
    }
}

/// Deterministic `#RRGGBB` for a user name.
///
/// 32-bit `h = c + (h << 5) - h` over the UTF-16 code units, low 24 bits,
/// upper-case hex. Matches what existing browser overlays derive.
pub fn derive_user_color(username: &str) -> String {
    let mut hash: i64 = 0;
    for unit in username.encode_utf16() {
        let shifted = ((hash as i32) << 5) as i64;
        hash = unit as i64 + (shifted - hash);
    }
    let rgb = (hash as i32) & 0x00FF_FFFF;
    format!("#{:06X}", rgb)
}
