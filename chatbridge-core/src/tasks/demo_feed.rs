// chatbridge-core/src/tasks/demo_feed.rs

use std::time::Duration;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use chatbridge_common::models::{ChatEvent, Platform};
use crate::config::ConfigStore;
use crate::eventbus::BroadcastHub;
use crate::gate::Gate;

pub const DEFAULT_DEMO_INTERVAL: Duration = Duration::from_secs(3);

const DEMO_USERS: [&str; 4] = ["User1", "StreamFan", "Gamer123", "Viewer99"];
const DEMO_MESSAGES: [&str; 4] = ["Hello!", "Cool stream!", "Larry Smells", "Nice overlay!"];

/// One synthetic chat line with the current theme.
pub fn demo_event(theme: &str) -> ChatEvent {
    let mut rng = rand::rng();
    let platform = *Platform::ALL.choose(&mut rng).unwrap_or(&Platform::Twitch);
    let user = DEMO_USERS.choose(&mut rng).copied().unwrap_or(DEMO_USERS[0]);
    let message = DEMO_MESSAGES.choose(&mut rng).copied().unwrap_or(DEMO_MESSAGES[0]);

    ChatEvent {
        platform,
        user: user.to_string(),
        message: message.to_string(),
        color: Some(platform.accent_color().to_string()),
        theme: theme.to_string(),
    }
}

struct Running {
    gate: Gate,
    handle: JoinHandle<()>,
}

/// Synthetic chat feed used while no platform is configured.
pub struct DemoFeed {
    hub: BroadcastHub,
    store: ConfigStore,
    interval: Duration,
    running: Option<Running>,
}

impl DemoFeed {
    pub fn new(hub: BroadcastHub, store: ConfigStore, interval: Duration) -> Self {
        Self { hub, store, interval, running: None }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts the timer. Returns false (and does nothing) if already running.
    pub fn start(&mut self) -> bool {
        if self.running.is_some() {
            return false;
        }

        let gate = Gate::new();
        let task_gate = gate.clone();
        let hub = self.hub.clone();
        let store = self.store.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let event = demo_event(&store.theme());
                if !task_gate.pass(|| hub.publish_event(event)) {
                    break;
                }
            }
        });

        info!("[DemoFeed] started (every {:?})", period);
        self.running = Some(Running { gate, handle });
        true
    }

    /// Stops the timer. Once this returns no further demo event is published.
    pub fn stop(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };
        running.gate.close();
        running.handle.abort();
        info!("[DemoFeed] stopped");
        true
    }
}

impl Drop for DemoFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
