// src/lib.rs

pub mod config;
pub mod eventbus;
pub mod platforms;
pub mod tasks;
pub mod test_utils;

mod gate;

pub use chatbridge_common::error::Error;
pub use chatbridge_common::models;
pub use config::ConfigStore;
pub use eventbus::{BroadcastHub, ViewerSession};
pub use platforms::supervisor::{SourceMode, SourceSupervisor};
