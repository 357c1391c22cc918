// chatbridge-server/src/context.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chatbridge_core::platforms::{PlatformAdapter, TikTokRelayAdapter, TwitchIrcAdapter};
use chatbridge_core::{BroadcastHub, ConfigStore, Error, SourceSupervisor};

/// Everything the HTTP/websocket handlers need. Cheap to clone.
#[derive(Clone)]
pub struct ServerContext {
    pub supervisor: Arc<SourceSupervisor>,
    pub hub: BroadcastHub,
    pub store: ConfigStore,
    pub public_dir: Option<PathBuf>,
}

impl ServerContext {
    /// Wires store, hub and supervisor around the given adapters.
    pub fn with_adapters(
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        demo_interval: Duration,
        public_dir: Option<PathBuf>,
    ) -> Self {
        let store = ConfigStore::default();
        let hub = BroadcastHub::new(store.clone());
        let supervisor = Arc::new(SourceSupervisor::with_demo_interval(
            store.clone(),
            hub.clone(),
            adapters,
            demo_interval,
        ));
        Self { supervisor, hub, store, public_dir }
    }

    /// Production wiring: real TikTok relay + Twitch IRC adapters.
    pub fn new(
        tiktok_relay_url: &str,
        demo_interval: Duration,
        public_dir: Option<PathBuf>,
    ) -> Result<Self, Error> {
        let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![
            Arc::new(TikTokRelayAdapter::new(tiktok_relay_url)?),
            Arc::new(TwitchIrcAdapter::new()),
        ];
        Ok(Self::with_adapters(adapters, demo_interval, public_dir))
    }
}
