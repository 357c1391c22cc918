pub mod demo_feed;

pub use demo_feed::{DemoFeed, DEFAULT_DEMO_INTERVAL};
