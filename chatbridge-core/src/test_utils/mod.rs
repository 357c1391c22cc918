pub mod helpers;

pub use helpers::{raw_chat, FakeAdapter};
