//! src/platforms/twitch_irc/client.rs

use std::collections::HashMap;
use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, split};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use tokio_native_tls::native_tls;
use tokio_native_tls::TlsConnector;
use tracing::{info, error, debug, trace};

pub const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv";
pub const TWITCH_IRC_TLS_PORT: u16 = 6697;

/// Minimal representation of a parsed IRC message from Twitch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTwitchMsg {
    pub tags: Option<String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl ParsedTwitchMsg {
    pub fn parse_irc_line(line: &str) -> Self {
        let mut rest = line.trim();
        let mut msg = Self::default();

        // 1) tags
        if rest.starts_with('@') {
            match rest.find(' ') {
                Some(space_pos) => {
                    msg.tags = Some(rest[..space_pos].to_string());
                    rest = &rest[space_pos + 1..];
                }
                None => {
                    msg.tags = Some(rest.to_string());
                    return msg;
                }
            }
        }

        // 2) prefix
        if rest.starts_with(':') {
            match rest.find(' ') {
                Some(space_pos) => {
                    msg.prefix = Some(rest[1..space_pos].to_string());
                    rest = &rest[space_pos + 1..];
                }
                None => {
                    msg.prefix = Some(rest[1..].to_string());
                    return msg;
                }
            }
        }

        // 3) command
        let mut parts = rest.splitn(2, ' ');
        if let Some(cmd) = parts.next() {
            msg.command = cmd.to_uppercase();
        }
        rest = parts.next().unwrap_or("");

        // 4) params + trailing
        let (before, trailing) = if let Some(stripped) = rest.strip_prefix(':') {
            ("", Some(stripped))
        } else if let Some(idx) = rest.find(" :") {
            (&rest[..idx], Some(&rest[idx + 2..]))
        } else {
            (rest, None)
        };
        msg.params.extend(before.split_whitespace().map(|s| s.to_string()));
        msg.trailing = trailing.map(|s| s.to_string());

        msg
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }

    pub fn tag_map(&self) -> HashMap<String, String> {
        self.tags.as_deref().map(parse_tags).unwrap_or_default()
    }
}

/// Splits `@k=v;k2=v2` into a map, unescaping IRCv3 tag values.
pub fn parse_tags(tag_str: &str) -> HashMap<String, String> {
    tag_str
        .trim_start_matches('@')
        .split(';')
        .filter(|kv| !kv.is_empty())
        .map(|kv| {
            let mut parts = kv.splitn(2, '=');
            let key = parts.next().unwrap_or("").to_string();
            let value = unescape_tag_value(parts.next().unwrap_or(""));
            (key, value)
        })
        .collect()
}

fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Low-level IRC client that connects to Twitch via TLS.
pub struct TwitchIrcClient {
    raw_outgoing: mpsc::UnboundedSender<String>,

    /// Every parsed line except PING, which is answered in the read loop.
    pub incoming: Option<mpsc::UnboundedReceiver<ParsedTwitchMsg>>,

    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl TwitchIrcClient {
    /// TLS-connects to `host:port`, sends the anonymous login sequence and
    /// spawns the read/write tasks. Does not wait for the welcome.
    pub async fn connect_anonymous(host: &str, port: u16, nick: &str) -> io::Result<Self> {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("TCP connect error: {e}")))?;

        let native_connector = native_tls::TlsConnector::new()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("TLSConnector::new() => {e}")))?;
        let connector = TlsConnector::from(native_connector);

        let tls_stream = connector.connect(host, tcp).await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("TLS connect() => {e}")))?;

        Ok(Self::from_stream(tls_stream, nick))
    }

    /// Wires an already-open stream; used directly by tests.
    pub fn from_stream<S>(stream: S, nick: &str) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = split(stream);

        let (tx_outgoing, rx_outgoing) = mpsc::unbounded_channel::<String>();
        let (tx_incoming, rx_incoming) = mpsc::unbounded_channel::<ParsedTwitchMsg>();

        let write_task = tokio::spawn(Self::writer_loop(write_half, rx_outgoing));

        // Read-only anonymous login; any PASS is accepted for justinfan nicks.
        tx_outgoing.send("CAP REQ :twitch.tv/tags twitch.tv/commands".to_string()).ok();
        tx_outgoing.send("PASS SCHMOOPIIE".to_string()).ok();
        tx_outgoing.send(format!("NICK {}", nick)).ok();

        let read_task = tokio::spawn(Self::reader_loop(read_half, tx_incoming, tx_outgoing.clone()));

        Self {
            raw_outgoing: tx_outgoing,
            incoming: Some(rx_incoming),
            read_task,
            write_task,
        }
    }

    async fn reader_loop<R>(
        read_half: R,
        tx_incoming: mpsc::UnboundedSender<ParsedTwitchMsg>,
        tx_outgoing: mpsc::UnboundedSender<String>,
    )
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(read_half);
        let mut line_buffer = String::new();

        loop {
            line_buffer.clear();
            match reader.read_line(&mut line_buffer).await {
                Ok(0) => {
                    info!("[TwitchIrc] read loop => EOF");
                    break;
                }
                Ok(_) => {
                    let line = line_buffer.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    trace!("<< {}", line);

                    let parsed = ParsedTwitchMsg::parse_irc_line(line);
                    if parsed.command == "PING" {
                        let token = parsed.trailing.as_deref().unwrap_or(TWITCH_IRC_HOST);
                        tx_outgoing.send(format!("PONG :{}", token)).ok();
                        debug!("[TwitchIrc] auto PONG -> {}", token);
                        continue;
                    }

                    if tx_incoming.send(parsed).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("[TwitchIrc] read error => {:?}", e);
                    break;
                }
            }
        }

        debug!("[TwitchIrc] reader_loop ended.");
    }

    async fn writer_loop<W>(
        mut write_half: W,
        mut rx_outgoing: mpsc::UnboundedReceiver<String>,
    )
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        let mut writer = BufWriter::new(&mut write_half);

        while let Some(line) = rx_outgoing.recv().await {
            trace!(">> {}", line);
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!("[TwitchIrc] writer error => {:?}", e);
                break;
            }
            if let Err(e) = writer.write_all(b"\r\n").await {
                error!("[TwitchIrc] writer error => {:?}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("[TwitchIrc] writer flush error => {:?}", e);
                break;
            }
        }

        debug!("[TwitchIrc] writer_loop ended.");
    }

    pub fn send_raw_line(&self, line: &str) {
        let _ = self.raw_outgoing.send(line.to_string());
    }

    pub fn join_channel(&self, channel: &str) {
        self.send_raw_line(&format!("JOIN {}", channel));
    }

    pub fn part_channel(&self, channel: &str) {
        self.send_raw_line(&format!("PART {}", channel));
    }

    pub fn is_alive(&self) -> bool {
        !self.read_task.is_finished()
    }

    /// Aborts the read/write tasks.
    pub fn shutdown(self) {
        self.read_task.abort();
        self.write_task.abort();
    }

    /// Stops reading, lets the writer flush what is already queued for up to
    /// `grace`, then drops the connection.
    pub async fn close(self, grace: Duration) {
        let Self { raw_outgoing, read_task, mut write_task, .. } = self;

        // The reader holds a sender for PONGs; the writer only ends once it is gone.
        read_task.abort();
        let _ = read_task.await;
        drop(raw_outgoing);

        if timeout(grace, &mut write_task).await.is_err() {
            debug!("[TwitchIrc] writer did not drain in {:?}; aborting", grace);
            write_task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::time::{timeout, Duration};

    #[test]
    fn test_parse_privmsg_with_tags() {
        let line = "@badge-info=;color=#1E90FF;display-name=Gamer123;user-id=42 \
                    :gamer123!gamer123@gamer123.tmi.twitch.tv PRIVMSG #streamer42 :Cool stream!";
        let msg = ParsedTwitchMsg::parse_irc_line(line);
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#streamer42".to_string()]);
        assert_eq!(msg.trailing.as_deref(), Some("Cool stream!"));
        assert_eq!(msg.nick(), Some("gamer123"));

        let tags = msg.tag_map();
        assert_eq!(tags.get("display-name").map(String::as_str), Some("Gamer123"));
        assert_eq!(tags.get("color").map(String::as_str), Some("#1E90FF"));
        assert_eq!(tags.get("badge-info").map(String::as_str), Some(""));
    }

    #[test]
    fn test_parse_without_tags_or_prefix() {
        let msg = ParsedTwitchMsg::parse_irc_line("PING :tmi.twitch.tv");
        assert_eq!(msg.command, "PING");
        assert!(msg.params.is_empty());
        assert_eq!(msg.trailing.as_deref(), Some("tmi.twitch.tv"));

        let msg = ParsedTwitchMsg::parse_irc_line(":tmi.twitch.tv 001 justinfan123 :Welcome, GLHF!");
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["justinfan123".to_string()]);
        assert_eq!(msg.nick(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn test_tag_values_are_unescaped() {
        let tags = parse_tags(r"@system-msg=hello\sthere\:\\ok;empty=");
        assert_eq!(tags.get("system-msg").map(String::as_str), Some(r"hello there;\ok"));
        assert_eq!(tags.get("empty").map(String::as_str), Some(""));
    }

    #[tokio::test]
    async fn test_client_logs_in_and_answers_ping() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let mut client = TwitchIrcClient::from_stream(client_side, "justinfan777");
        let mut incoming = client.incoming.take().unwrap();

        let (server_read, mut server_write) = tokio::io::split(server_side);
        let mut server_lines = BufReader::new(server_read).lines();

        let mut login = Vec::new();
        for _ in 0..3 {
            let line = timeout(Duration::from_secs(1), server_lines.next_line())
                .await.unwrap().unwrap().unwrap();
            login.push(line);
        }
        assert_eq!(login[1], "PASS SCHMOOPIIE");
        assert_eq!(login[2], "NICK justinfan777");

        server_write.write_all(b"PING :tmi.twitch.tv\r\n:tmi.twitch.tv 001 justinfan777 :Welcome\r\n").await.unwrap();

        let pong = timeout(Duration::from_secs(1), server_lines.next_line())
            .await.unwrap().unwrap().unwrap();
        assert_eq!(pong, "PONG :tmi.twitch.tv");

        let welcome = timeout(Duration::from_secs(1), incoming.recv()).await.unwrap().unwrap();
        assert_eq!(welcome.command, "001");

        client.join_channel("#streamer42");
        let join = timeout(Duration::from_secs(1), server_lines.next_line())
            .await.unwrap().unwrap().unwrap();
        assert_eq!(join, "JOIN #streamer42");

        client.shutdown();
    }
}
