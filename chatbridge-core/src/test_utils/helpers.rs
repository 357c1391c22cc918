// File: chatbridge-core/src/test_utils/helpers.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use chatbridge_common::models::Platform;
use crate::platforms::{
    PlatformAdapter, PlatformConnection, RawChatMessage, TikTokChatData, TwitchChatMessage,
};
use crate::Error;

/// Shared bookkeeping between a `FakeAdapter` and the connections it opened.
#[derive(Default)]
struct FakeLedger {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    fail_next: AtomicBool,
    /// One entry per opened handle; `None` once its stream was ended.
    senders: Mutex<Vec<(String, Option<mpsc::Sender<RawChatMessage>>)>>,
}

/// In-memory stand-in for a platform adapter. Records every connect and
/// disconnect and lets a test inject raw messages into any handle it opened.
#[derive(Clone)]
pub struct FakeAdapter {
    platform: Platform,
    ledger: Arc<FakeLedger>,
}

impl FakeAdapter {
    pub fn new(platform: Platform) -> Self {
        Self { platform, ledger: Arc::new(FakeLedger::default()) }
    }

    pub fn connects(&self) -> usize {
        self.ledger.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.ledger.disconnects.load(Ordering::SeqCst)
    }

    /// Handles currently open (connected and not yet disconnected).
    pub fn live(&self) -> usize {
        self.ledger.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open handles ever observed.
    pub fn max_live(&self) -> usize {
        self.ledger.max_live.load(Ordering::SeqCst)
    }

    /// Makes the next `connect` fail with `ConnectFailure`.
    pub fn fail_next_connect(&self) {
        self.ledger.fail_next.store(true, Ordering::SeqCst);
    }

    /// Identities of every handle ever opened, oldest first.
    pub fn identities(&self) -> Vec<String> {
        self.ledger.senders.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Pushes a raw message into the most recently opened handle.
    pub async fn emit(&self, raw: RawChatMessage) -> bool {
        let newest = self.ledger.senders.lock().len().checked_sub(1);
        match newest {
            Some(index) => self.emit_to(index, raw).await,
            None => false,
        }
    }

    /// Pushes a raw message into the `index`-th handle ever opened (0 = first).
    /// Returns false once that handle's receiving side is gone.
    pub async fn emit_to(&self, index: usize, raw: RawChatMessage) -> bool {
        let tx = self.ledger.senders.lock().get(index).and_then(|(_, tx)| tx.clone());
        match tx {
            Some(tx) => tx.send(raw).await.is_ok(),
            None => false,
        }
    }

    /// Ends the event stream of the `index`-th handle, as an upstream EOF would.
    pub fn end_stream(&self, index: usize) {
        if let Some((_, tx)) = self.ledger.senders.lock().get_mut(index) {
            tx.take();
        }
    }

    /// Pushes a well-formed chat line from `user`.
    pub async fn emit_chat(&self, user: &str, text: &str) -> bool {
        self.emit(raw_chat(self.platform, user, text)).await
    }
}

/// Well-formed platform-native message for `platform`.
pub fn raw_chat(platform: Platform, user: &str, text: &str) -> RawChatMessage {
    match platform {
        Platform::TikTok => RawChatMessage::TikTok(TikTokChatData {
            unique_id: Some(user.to_string()),
            nickname: None,
            comment: Some(text.to_string()),
        }),
        Platform::Twitch => RawChatMessage::Twitch(TwitchChatMessage {
            login: Some(user.to_lowercase()),
            display_name: Some(user.to_string()),
            color: None,
            text: Some(text.to_string()),
        }),
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn connect(&self, identity: &str) -> Result<Box<dyn PlatformConnection>, Error> {
        if self.ledger.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::connect(self.platform, format!("'{identity}' unreachable")));
        }
        // Yield like a real network connect would.
        tokio::task::yield_now().await;

        let (tx, rx) = mpsc::channel(64);
        self.ledger.senders.lock().push((identity.to_string(), Some(tx)));
        self.ledger.connects.fetch_add(1, Ordering::SeqCst);
        let live = self.ledger.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.ledger.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(FakeConnection {
            platform: self.platform,
            identity: identity.to_string(),
            rx: Some(rx),
            open: true,
            ledger: self.ledger.clone(),
        }))
    }
}

struct FakeConnection {
    platform: Platform,
    identity: String,
    rx: Option<mpsc::Receiver<RawChatMessage>>,
    open: bool,
    ledger: Arc<FakeLedger>,
}

#[async_trait]
impl PlatformConnection for FakeConnection {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<RawChatMessage>> {
        self.rx.take()
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        tokio::task::yield_now().await;
        if self.open {
            self.open = false;
            self.ledger.disconnects.fetch_add(1, Ordering::SeqCst);
            self.ledger.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
