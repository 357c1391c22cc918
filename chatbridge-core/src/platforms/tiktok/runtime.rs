// tiktok/runtime.rs
//
// TikTok LIVE chat reached through a webcast relay: the relay holds the
// signed upstream session and re-emits events as JSON websocket frames of the
// form {"event": "...", "data": {...}}.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use chatbridge_common::models::{ChatEvent, Platform};
use crate::Error;
use crate::platforms::{non_empty, PlatformAdapter, PlatformConnection, RawChatMessage, RAW_EVENT_BUFFER};

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:21213/";

const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TikTokChatData {
    pub unique_id: Option<String>,
    pub nickname: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

pub fn parse_relay_frame(text: &str) -> Result<RelayFrame, Error> {
    serde_json::from_str(text).map_err(|e| Error::MalformedEvent(format!("relay frame: {e}")))
}

pub(crate) fn to_chat_event(data: TikTokChatData, theme: &str) -> Result<ChatEvent, Error> {
    let user = non_empty(data.unique_id)
        .or_else(|| non_empty(data.nickname))
        .ok_or_else(|| Error::MalformedEvent("tiktok chat without uniqueId".into()))?;
    let message = data.comment
        .ok_or_else(|| Error::MalformedEvent("tiktok chat without comment".into()))?;

    Ok(ChatEvent {
        platform: Platform::TikTok,
        user,
        message,
        color: Some(Platform::TikTok.accent_color().to_string()),
        theme: theme.to_string(),
    })
}

/// `@someone ` -> `someone`
pub fn tiktok_unique_id(username: &str) -> String {
    username.trim().trim_start_matches('@').to_string()
}

pub struct TikTokRelayAdapter {
    relay_url: Url,
}

impl TikTokRelayAdapter {
    pub fn new(relay_url: &str) -> Result<Self, Error> {
        let relay_url = Url::parse(relay_url)
            .map_err(|e| Error::Parse(format!("invalid TikTok relay url '{relay_url}': {e}")))?;
        Ok(Self { relay_url })
    }

    pub fn session_url(&self, username: &str) -> Url {
        let mut url = self.relay_url.clone();
        url.query_pairs_mut().append_pair("uniqueId", &tiktok_unique_id(username));
        url
    }
}

#[async_trait]
impl PlatformAdapter for TikTokRelayAdapter {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn connect(&self, identity: &str) -> Result<Box<dyn PlatformConnection>, Error> {
        if tiktok_unique_id(identity).is_empty() {
            return Err(Error::connect(Platform::TikTok, "empty username"));
        }

        let url = self.session_url(identity);
        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::connect(Platform::TikTok, e.to_string()))?;
        info!("[TikTok] relay connected for @{}", tiktok_unique_id(identity));

        let (tx, rx) = mpsc::channel::<RawChatMessage>(RAW_EVENT_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        if let Err(e) = ws.close(None).await {
                            debug!("[TikTok] close handshake failed: {}", e);
                        }
                        break;
                    }
                    next = ws.next() => {
                        let msg = match next {
                            Some(Ok(m)) => m,
                            Some(Err(e)) => {
                                warn!("[TikTok] relay read error: {}", e);
                                break;
                            }
                            None => break,
                        };
                        match msg {
                            Message::Text(txt) => match handle_frame(&txt) {
                                FrameOutcome::Chat(raw) => {
                                    if tx.send(raw).await.is_err() {
                                        break;
                                    }
                                }
                                FrameOutcome::Skip => {}
                                FrameOutcome::StreamEnd => {
                                    info!("[TikTok] stream ended");
                                    break;
                                }
                            },
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                }
            }
            debug!("[TikTok] read loop ended.");
        });

        Ok(Box::new(TikTokRelayConnection {
            identity: identity.to_string(),
            rx: Some(rx),
            shutdown_tx: Some(shutdown_tx),
            read_loop_handle: Some(handle),
        }))
    }
}

enum FrameOutcome {
    Chat(RawChatMessage),
    Skip,
    StreamEnd,
}

fn handle_frame(text: &str) -> FrameOutcome {
    let frame = match parse_relay_frame(text) {
        Ok(f) => f,
        Err(e) => {
            debug!("[TikTok] dropping frame: {}", e);
            return FrameOutcome::Skip;
        }
    };

    match frame.event.as_str() {
        "chat" => match serde_json::from_value::<TikTokChatData>(frame.data) {
            Ok(data) => FrameOutcome::Chat(RawChatMessage::TikTok(data)),
            Err(e) => {
                debug!("[TikTok] dropping chat frame: {}", e);
                FrameOutcome::Skip
            }
        },
        "streamEnd" => FrameOutcome::StreamEnd,
        other => {
            trace!("[TikTok] ignoring relay event {}", other);
            FrameOutcome::Skip
        }
    }
}

pub struct TikTokRelayConnection {
    identity: String,
    rx: Option<mpsc::Receiver<RawChatMessage>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    read_loop_handle: Option<JoinHandle<()>>,
}

#[async_trait]
impl PlatformConnection for TikTokRelayConnection {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<RawChatMessage>> {
        self.rx.take()
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };
        let delivered = shutdown_tx.send(()).is_ok();

        if let Some(mut handle) = self.read_loop_handle.take() {
            if timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        if delivered {
            Ok(())
        } else {
            Err(Error::disconnect(Platform::TikTok, "relay connection already closed"))
        }
    }
}
