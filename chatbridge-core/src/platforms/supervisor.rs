// File: src/platforms/supervisor.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chatbridge_common::models::{ConfigUpdate, Configuration, Platform};
use crate::config::ConfigStore;
use crate::eventbus::BroadcastHub;
use crate::gate::Gate;
use crate::platforms::{PlatformAdapter, PlatformConnection, RawChatMessage};
use crate::tasks::demo_feed::{DemoFeed, DEFAULT_DEMO_INTERVAL};
use crate::Error;

/// Pause between an upstream stream ending and the automatic reconnect.
pub const REVIVE_DELAY: Duration = Duration::from_millis(500);

/// Which sources are supposed to be feeding the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Not started yet, or shut down.
    NoSource,
    TikTokOnly,
    TwitchOnly,
    Both,
    Fallback,
}

impl SourceMode {
    pub fn for_config(config: &Configuration) -> Self {
        let tiktok = config.configured_identity(Platform::TikTok).is_some();
        let twitch = config.configured_identity(Platform::Twitch).is_some();
        match (tiktok, twitch) {
            (false, false) => SourceMode::Fallback,
            (true, false) => SourceMode::TikTokOnly,
            (false, true) => SourceMode::TwitchOnly,
            (true, true) => SourceMode::Both,
        }
    }

    pub fn wants_fallback(self) -> bool {
        self == SourceMode::Fallback
    }
}

/// Sent by a pump whose upstream stream ended without the supervisor asking.
#[derive(Debug, Clone, Copy)]
struct StreamEnded {
    platform: Platform,
    link_id: u64,
}

/// One live upstream session plus the task pumping it into the hub.
struct SourceLink {
    id: u64,
    connection: Box<dyn PlatformConnection>,
    gate: Gate,
    pump: JoinHandle<()>,
}

impl SourceLink {
    fn is_live(&self) -> bool {
        !self.pump.is_finished()
    }
}

struct SupervisorState {
    mode: SourceMode,
    /// Identities as of the last applied configuration.
    applied: (String, String),
    links: BTreeMap<Platform, SourceLink>,
    /// Platforms whose stream ended and still need a new handle.
    stale: BTreeSet<Platform>,
    next_link_id: u64,
    demo: DemoFeed,
}

/// Sole owner of upstream connections and the demo feed. Every change goes
/// through `apply_configuration`, which runs one call at a time.
pub struct SourceSupervisor {
    store: ConfigStore,
    hub: BroadcastHub,
    adapters: BTreeMap<Platform, Arc<dyn PlatformAdapter>>,
    state: Mutex<SupervisorState>,
    ended_tx: mpsc::UnboundedSender<StreamEnded>,
    ended_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<StreamEnded>>>,
}

impl SourceSupervisor {
    pub fn new(
        store: ConfigStore,
        hub: BroadcastHub,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
    ) -> Self {
        Self::with_demo_interval(store, hub, adapters, DEFAULT_DEMO_INTERVAL)
    }

    pub fn with_demo_interval(
        store: ConfigStore,
        hub: BroadcastHub,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        demo_interval: Duration,
    ) -> Self {
        let adapters = adapters.into_iter().map(|a| (a.platform(), a)).collect();
        let applied = {
            let cfg = store.snapshot();
            (cfg.tiktok_username.clone(), cfg.twitch_channel.clone())
        };
        let demo = DemoFeed::new(hub.clone(), store.clone(), demo_interval);
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();

        Self {
            store,
            hub,
            adapters,
            state: Mutex::new(SupervisorState {
                mode: SourceMode::NoSource,
                applied,
                links: BTreeMap::new(),
                stale: BTreeSet::new(),
                next_link_id: 0,
                demo,
            }),
            ended_tx,
            ended_rx: parking_lot::Mutex::new(Some(ended_rx)),
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Initial evaluation: connects whatever the store already names and starts
    /// the demo feed when nothing is configured.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        let config = self.store.snapshot();
        info!("[Supervisor] starting with {:?}", SourceMode::for_config(&config));
        self.reconcile(&mut state, &config, true).await;
    }

    /// Merge `update`, push the merged config to every viewer, then reconnect
    /// sources if an identity changed. Returns the merged configuration.
    pub async fn apply_configuration(&self, update: ConfigUpdate) -> Result<Configuration, Error> {
        update.validate()?;

        let mut state = self.state.lock().await;

        let merged = self.store.merge(&update);
        self.hub.publish_config(&merged);

        let identities_changed = {
            let (tiktok, twitch) = merged.identities();
            state.applied.0 != tiktok || state.applied.1 != twitch
        };
        debug!("[Supervisor] config applied (identities changed: {})", identities_changed);

        self.reconcile(&mut state, &merged, identities_changed).await;
        Ok(merged)
    }

    /// Reconnects platforms whose upstream stream ended on its own. Runs for
    /// the life of the process; a second call returns immediately.
    pub async fn watch_streams(self: Arc<Self>) {
        let taken = self.ended_rx.lock().take();
        let Some(mut ended_rx) = taken else {
            warn!("[Supervisor] stream watcher already running");
            return;
        };

        while let Some(notice) = ended_rx.recv().await {
            tokio::time::sleep(REVIVE_DELAY).await;

            let mut state = self.state.lock().await;
            if state.mode == SourceMode::NoSource {
                continue;
            }
            let current = state.links.get(&notice.platform).map(|l| l.id);
            if current != Some(notice.link_id) && !state.stale.contains(&notice.platform) {
                // Already replaced by a later apply.
                continue;
            }
            let config = self.store.snapshot();
            self.revive_stale(&mut state, &config).await;
        }
        debug!("[Supervisor] stream watcher ended");
    }

    /// Closes every live handle and stops the demo feed.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.demo.stop();
        self.disconnect_all(&mut state).await;
        state.stale.clear();
        state.mode = SourceMode::NoSource;
        info!("[Supervisor] shut down");
    }

    pub async fn mode(&self) -> SourceMode {
        self.state.lock().await.mode
    }

    pub async fn demo_running(&self) -> bool {
        self.state.lock().await.demo.is_running()
    }

    /// (platform, identity) for every Connection Handle whose stream is still open.
    pub async fn live_connections(&self) -> Vec<(Platform, String)> {
        let state = self.state.lock().await;
        state
            .links
            .iter()
            .filter(|(_, link)| link.is_live())
            .map(|(p, link)| (*p, link.connection.identity().to_string()))
            .collect()
    }

    async fn reconcile(&self, state: &mut SupervisorState, config: &Configuration, reconnect: bool) {
        let target = SourceMode::for_config(config);

        // Fallback stops before any connect is awaited and starts only after
        // the old handles are gone.
        if !target.wants_fallback() {
            state.demo.stop();
        }

        if reconnect {
            self.disconnect_all(state).await;
            state.stale.clear();
            for platform in Platform::ALL {
                if let Some(identity) = config.configured_identity(platform) {
                    self.connect_platform(state, platform, identity).await;
                }
            }
            let (tiktok, twitch) = config.identities();
            state.applied = (tiktok.to_string(), twitch.to_string());
        } else {
            self.revive_stale(state, config).await;
        }

        if target.wants_fallback() {
            state.demo.start();
        }

        if state.mode != target {
            info!("[Supervisor] mode {:?} -> {:?}", state.mode, target);
            state.mode = target;
        }
    }

    /// Drops links whose stream has ended and reconnects them if their
    /// platform is still configured. A failed reconnect stays stale.
    async fn revive_stale(&self, state: &mut SupervisorState, config: &Configuration) {
        let ended: Vec<Platform> = state
            .links
            .iter()
            .filter(|(_, link)| !link.is_live())
            .map(|(p, _)| *p)
            .collect();
        for platform in ended {
            if let Some(link) = state.links.remove(&platform) {
                info!("[Supervisor] {} stream for '{}' ended", platform, link.connection.identity());
                self.close_link(platform, link).await;
                state.stale.insert(platform);
            }
        }

        let stale = std::mem::take(&mut state.stale);
        for platform in stale {
            match config.configured_identity(platform) {
                Some(identity) => {
                    if !self.connect_platform(state, platform, identity).await {
                        state.stale.insert(platform);
                    }
                }
                None => debug!("[Supervisor] {} no longer configured; not reconnecting", platform),
            }
        }
    }

    async fn connect_platform(&self, state: &mut SupervisorState, platform: Platform, identity: &str) -> bool {
        let Some(adapter) = self.adapters.get(&platform) else {
            warn!("[Supervisor] no adapter registered for {}; '{}' stays offline", platform, identity);
            return false;
        };

        match adapter.connect(identity).await {
            Ok(mut connection) => {
                let Some(events) = connection.take_events() else {
                    error!("[Supervisor] {} connection has no event stream", platform);
                    if let Err(e) = connection.disconnect().await {
                        debug!("[Supervisor] {} disconnect: {} (ignored)", platform, e);
                    }
                    return false;
                };
                let id = state.next_link_id;
                state.next_link_id += 1;
                let gate = Gate::new();
                let pump = self.spawn_pump(platform, id, events, gate.clone());
                info!("[Supervisor] {} connected to '{}'", platform, identity);
                state.links.insert(platform, SourceLink { id, connection, gate, pump });
                true
            }
            Err(e) => {
                warn!("[Supervisor] {} connect to '{}' failed: {}", platform, identity, e);
                false
            }
        }
    }

    fn spawn_pump(
        &self,
        platform: Platform,
        link_id: u64,
        mut events: mpsc::Receiver<RawChatMessage>,
        gate: Gate,
    ) -> JoinHandle<()> {
        let hub = self.hub.clone();
        let store = self.store.clone();
        let ended_tx = self.ended_tx.clone();
        tokio::spawn(async move {
            while let Some(raw) = events.recv().await {
                match raw.normalize(&store.theme()) {
                    Ok(event) => {
                        if !gate.pass(|| hub.publish_event(event)) {
                            return;
                        }
                    }
                    Err(e) => debug!("[Supervisor] dropping {} event: {}", platform, e),
                }
            }
            if gate.is_open() {
                warn!("[Supervisor] {} event stream ended upstream", platform);
                let _ = ended_tx.send(StreamEnded { platform, link_id });
            }
        })
    }

    async fn disconnect_all(&self, state: &mut SupervisorState) {
        let links = std::mem::take(&mut state.links);
        for (platform, link) in links {
            self.close_link(platform, link).await;
        }
    }

    async fn close_link(&self, platform: Platform, mut link: SourceLink) {
        // Unsubscribe first so nothing from this handle lands after it is replaced.
        link.gate.close();
        link.pump.abort();

        match link.connection.disconnect().await {
            Ok(()) => info!("[Supervisor] {} disconnected", platform),
            Err(e) => warn!("[Supervisor] {} disconnect: {} (ignored)", platform, e),
        }
    }
}
