//! src/config/mod.rs
//!
//! Process-wide runtime configuration. Readers get full snapshots; the only
//! writer is the source supervisor.

use std::sync::Arc;
use parking_lot::RwLock;

use chatbridge_common::models::{ConfigUpdate, Configuration};

#[derive(Clone, Default)]
pub struct ConfigStore {
    inner: Arc<RwLock<Configuration>>,
}

impl ConfigStore {
    pub fn new(initial: Configuration) -> Self {
        Self { inner: Arc::new(RwLock::new(initial)) }
    }

    /// A consistent copy of the current configuration.
    pub fn snapshot(&self) -> Configuration {
        self.inner.read().clone()
    }

    pub fn theme(&self) -> String {
        self.inner.read().theme.clone()
    }

    /// Applies `update` under the write lock and returns the merged value.
    pub(crate) fn merge(&self, update: &ConfigUpdate) -> Configuration {
        let mut guard = self.inner.write();
        let merged = guard.merged(update);
        *guard = merged.clone();
        merged
    }
}
