//! src/platforms/twitch_irc/runtime.rs
use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, trace};

use chatbridge_common::models::{ChatEvent, Platform};
use crate::Error;
use crate::platforms::{non_empty, PlatformAdapter, PlatformConnection, RawChatMessage, RAW_EVENT_BUFFER};

use super::client::{ParsedTwitchMsg, TwitchIrcClient, TWITCH_IRC_HOST, TWITCH_IRC_TLS_PORT};

const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Fields pulled out of one PRIVMSG.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TwitchChatMessage {
    pub login: Option<String>,
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub text: Option<String>,
}

impl TwitchChatMessage {
    pub fn from_privmsg(msg: &ParsedTwitchMsg) -> Self {
        let mut tags = msg.tag_map();
        Self {
            login: msg.nick().map(str::to_string),
            display_name: tags.remove("display-name"),
            color: tags.remove("color"),
            text: msg.trailing.clone(),
        }
    }
}

pub(crate) fn to_chat_event(msg: TwitchChatMessage, theme: &str) -> Result<ChatEvent, Error> {
    let user = non_empty(msg.display_name)
        .or_else(|| non_empty(msg.login))
        .ok_or_else(|| Error::MalformedEvent("twitch PRIVMSG without a user".into()))?;
    let message = msg.text
        .ok_or_else(|| Error::MalformedEvent("twitch PRIVMSG without text".into()))?;
    let color = non_empty(msg.color).unwrap_or_else(|| Platform::Twitch.accent_color().to_string());

    Ok(ChatEvent {
        platform: Platform::Twitch,
        user,
        message,
        color: Some(color),
        theme: theme.to_string(),
    })
}

/// `#Channel` / `channel` -> `#channel`.
pub fn irc_channel_name(channel: &str) -> String {
    format!("#{}", channel.trim().trim_start_matches('#').to_lowercase())
}

/// Connects anonymously to Twitch chat and reads one channel.
pub struct TwitchIrcAdapter {
    host: String,
    port: u16,
}

impl TwitchIrcAdapter {
    pub fn new() -> Self {
        Self::with_endpoint(TWITCH_IRC_HOST, TWITCH_IRC_TLS_PORT)
    }

    pub fn with_endpoint(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl Default for TwitchIrcAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for TwitchIrcAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitch
    }

    async fn connect(&self, identity: &str) -> Result<Box<dyn PlatformConnection>, Error> {
        let channel = irc_channel_name(identity);
        if channel.len() < 2 {
            return Err(Error::connect(Platform::Twitch, "empty channel name"));
        }

        let nick = format!("justinfan{}", rand::rng().random_range(10_000..99_999));
        let client = TwitchIrcClient::connect_anonymous(&self.host, self.port, &nick)
            .await
            .map_err(|e| Error::connect(Platform::Twitch, e.to_string()))?;

        let conn = TwitchIrcConnection::establish(client, identity, &channel).await?;
        info!("[TwitchIrc] joined {} as {}", channel, nick);
        Ok(Box::new(conn))
    }
}

pub struct TwitchIrcConnection {
    identity: String,
    channel: String,
    client: Option<TwitchIrcClient>,
    read_loop_handle: Option<JoinHandle<()>>,
    rx: Option<mpsc::Receiver<RawChatMessage>>,
}

impl TwitchIrcConnection {
    /// Waits for the welcome, joins `channel` and starts forwarding PRIVMSGs.
    pub async fn establish(
        mut client: TwitchIrcClient,
        identity: &str,
        channel: &str,
    ) -> Result<Self, Error> {
        let mut incoming = client.incoming.take()
            .ok_or_else(|| Error::connect(Platform::Twitch, "no incoming channel on IRC client"))?;

        match timeout(WELCOME_TIMEOUT, Self::await_welcome(&mut incoming)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                client.shutdown();
                return Err(e);
            }
            Err(_) => {
                client.shutdown();
                return Err(Error::connect(Platform::Twitch, "timed out waiting for welcome"));
            }
        }

        client.join_channel(channel);

        let (tx, rx) = mpsc::channel::<RawChatMessage>(RAW_EVENT_BUFFER);
        let handle = tokio::spawn(async move {
            while let Some(msg) = incoming.recv().await {
                match msg.command.as_str() {
                    "PRIVMSG" => {
                        let raw = RawChatMessage::Twitch(TwitchChatMessage::from_privmsg(&msg));
                        if tx.send(raw).await.is_err() {
                            break;
                        }
                    }
                    "RECONNECT" => {
                        // Server is going away; end the stream so the handle gets replaced.
                        info!("[TwitchIrc] server requested reconnect");
                        break;
                    }
                    other => trace!("[TwitchIrc] ignoring {}", other),
                }
            }
            debug!("[TwitchIrc] read loop ended.");
        });

        Ok(Self {
            identity: identity.to_string(),
            channel: channel.to_string(),
            client: Some(client),
            read_loop_handle: Some(handle),
            rx: Some(rx),
        })
    }

    async fn await_welcome(
        incoming: &mut tokio::sync::mpsc::UnboundedReceiver<ParsedTwitchMsg>,
    ) -> Result<(), Error> {
        while let Some(msg) = incoming.recv().await {
            match msg.command.as_str() {
                "001" => return Ok(()),
                "NOTICE" => {
                    let reason = msg.trailing.unwrap_or_else(|| "login rejected".into());
                    return Err(Error::connect(Platform::Twitch, reason));
                }
                _ => {}
            }
        }
        Err(Error::connect(Platform::Twitch, "connection closed before welcome"))
    }
}

#[async_trait]
impl PlatformConnection for TwitchIrcConnection {
    fn platform(&self) -> Platform {
        Platform::Twitch
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<RawChatMessage>> {
        self.rx.take()
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(h) = self.read_loop_handle.take() {
            h.abort();
        }
        let Some(cli) = self.client.take() else {
            return Ok(());
        };

        let alive = cli.is_alive();
        if alive {
            cli.part_channel(&self.channel);
        }
        cli.close(CLOSE_GRACE).await;

        if alive {
            Ok(())
        } else {
            Err(Error::disconnect(Platform::Twitch, "connection already closed"))
        }
    }
}
