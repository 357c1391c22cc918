//! src/eventbus/mod.rs
//!
//! Broadcast hub: the single fan-out point between chat sources and the
//! connected viewers. No replay buffer; a viewer only sees what is published
//! after it joined, plus one `initial_state` snapshot on join.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use chatbridge_common::models::{ChatEvent, Configuration, ViewerId, ViewerMessage};
use crate::config::ConfigStore;

/// Receiving end handed to the transport layer for one display client.
pub struct ViewerSession {
    id: ViewerId,
    rx: mpsc::UnboundedReceiver<ViewerMessage>,
}

impl ViewerSession {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<ViewerMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ViewerMessage> {
        self.rx.try_recv().ok()
    }
}

#[derive(Clone)]
pub struct BroadcastHub {
    sessions: Arc<RwLock<HashMap<ViewerId, mpsc::UnboundedSender<ViewerMessage>>>>,
    store: ConfigStore,
}

impl BroadcastHub {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    /// Registers a new viewer and queues the current configuration for it.
    ///
    /// Holds the session write lock across snapshot + registration, so a
    /// concurrent config broadcast lands either before the snapshot was taken
    /// (and is in it) or after the viewer is registered.
    pub fn join(&self) -> ViewerSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut sessions = self.sessions.write();
        let _ = tx.send(ViewerMessage::InitialState(self.store.snapshot()));
        sessions.insert(id, tx);
        info!("[Hub] viewer {} joined ({} connected)", id, sessions.len());

        ViewerSession { id, rx }
    }

    /// Deregisters a viewer. Returns false if it was already gone.
    pub fn leave(&self, id: ViewerId) -> bool {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(&id).is_some();
        if removed {
            info!("[Hub] viewer {} left ({} connected)", id, sessions.len());
        }
        removed
    }

    pub fn viewer_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn publish_event(&self, event: ChatEvent) {
        self.publish(ViewerMessage::Chat(event));
    }

    pub fn publish_config(&self, config: &Configuration) {
        self.publish(ViewerMessage::ConfigUpdate(config.clone()));
    }

    fn publish(&self, message: ViewerMessage) {
        let mut dead = Vec::new();
        {
            let sessions = self.sessions.read();
            for (id, tx) in sessions.iter() {
                if tx.send(message.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut sessions = self.sessions.write();
            for id in dead {
                sessions.remove(&id);
                debug!("[Hub] pruned closed viewer {}", id);
            }
        }
    }
}
