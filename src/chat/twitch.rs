//! Anonymous read-only Twitch chat client
//!
//! Logs in as a `justinfan` guest over plain IRC, joins one channel and
//! reports what it sees. Each session runs on its own reader thread; the
//! thread only ever talks to the rest of the program through the listener.

use super::irc::IrcLine;
use super::source::{ChatEvent, ChatEventKind, ChatListener, ChatSource, MessageEvent, SessionId};
use crate::{ChatSpeakError, Result};
use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_HOST: &str = "irc.chat.twitch.tv";
/// Plaintext IRC. The connection is anonymous and read-only, and no TLS
/// stack is linked; TLS would be port 6697.
pub const DEFAULT_PORT: u16 = 6667;

/// Twitch pings roughly every five minutes; we check in sooner
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(60);

/// Where and what to join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitchConfig {
    pub host: String,
    pub port: u16,
    pub channel: String,
    /// Bound on both the TCP connect and the wait for the welcome reply
    pub connect_timeout: Duration,
    /// Silence after which we PING the server; a second silent interval
    /// means the connection is dead
    pub keepalive: Duration,
}

impl TwitchConfig {
    pub fn new(channel: &str) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            channel: normalize_channel(channel),
            connect_timeout: Duration::from_secs(10),
            keepalive: DEFAULT_KEEPALIVE,
        }
    }
}

/// Channel names are lowercase and carry no leading '#'
pub fn normalize_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}

/// The session currently owned by the client
struct Live {
    session: SessionId,
    stop: Arc<AtomicBool>,
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl Live {
    /// Silence the reader thread and close its socket
    fn close(self) {
        self.stop.store(true, Ordering::SeqCst);
        let stream = self.stream.lock().ok().and_then(|mut s| s.take());
        if let Some(stream) = stream {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Socket shutdown for {:?}: {}", self.session, e);
            }
        }
    }
}

/// Twitch IRC chat source
pub struct TwitchChat {
    config: TwitchConfig,
    listener: Option<ChatListener>,
    next_session: u64,
    live: Option<Live>,
}

impl TwitchChat {
    pub fn new(config: TwitchConfig) -> Self {
        Self {
            config,
            listener: None,
            next_session: 0,
            live: None,
        }
    }

    pub fn channel(&self) -> &str {
        &self.config.channel
    }
}

impl ChatSource for TwitchChat {
    fn set_listener(&mut self, listener: Option<ChatListener>) {
        self.listener = listener;
    }

    fn connect(&mut self) -> Result<SessionId> {
        let listener = self
            .listener
            .clone()
            .ok_or_else(|| ChatSpeakError::Chat("no chat listener registered".to_string()))?;

        if self.config.channel.is_empty() {
            return Err(ChatSpeakError::Chat("no channel configured".to_string()));
        }

        if let Some(live) = self.live.take() {
            debug!("Closing previous session {:?}", live.session);
            live.close();
        }

        self.next_session += 1;
        let session = SessionId(self.next_session);
        let stop = Arc::new(AtomicBool::new(false));
        let stream = Arc::new(Mutex::new(None));

        let worker = Session {
            config: self.config.clone(),
            id: session,
            stop: Arc::clone(&stop),
            stream: Arc::clone(&stream),
            listener,
        };
        thread::Builder::new()
            .name(format!("twitch-{}", session.0))
            .spawn(move || worker.run())
            .map_err(|e| ChatSpeakError::Chat(format!("Failed to spawn reader thread: {}", e)))?;

        info!("Connecting to #{} as session {:?}", self.config.channel, session);
        self.live = Some(Live {
            session,
            stop,
            stream,
        });
        Ok(session)
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(live) = self.live.take() {
            info!("Disconnecting session {:?}", live.session);
            live.close();
        }
        Ok(())
    }
}

impl Drop for TwitchChat {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.close();
        }
    }
}

/// State owned by one reader thread
struct Session {
    config: TwitchConfig,
    id: SessionId,
    stop: Arc<AtomicBool>,
    stream: Arc<Mutex<Option<TcpStream>>>,
    listener: ChatListener,
}

impl Session {
    fn emit(&self, kind: ChatEventKind) {
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        (self.listener)(ChatEvent {
            session: self.id,
            kind,
        });
    }

    fn run(self) {
        let stream = match self.open() {
            Ok(Some(stream)) => stream,
            Ok(None) => return,
            Err(e) => {
                self.emit(ChatEventKind::ConnectFailed(e.to_string()));
                return;
            }
        };

        if let Err(e) = self.read_loop(stream) {
            debug!("Session {:?} ended: {}", self.id, e);
        }
    }

    /// Connect, publish the socket and send the login
    ///
    /// `Ok(None)` means the session was closed while connecting.
    fn open(&self) -> io::Result<Option<TcpStream>> {
        let addr = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host did not resolve"))?;

        debug!("Session {:?} connecting to {}", self.id, addr);
        let mut stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)?;
        stream.set_read_timeout(Some(self.config.connect_timeout))?;

        if let Ok(mut slot) = self.stream.lock() {
            *slot = Some(stream.try_clone()?);
        }
        // close() sets the flag before taking the slot, so one of us sees
        // the other and the socket never outlives its session
        if self.stop.load(Ordering::SeqCst) {
            let _ = stream.shutdown(Shutdown::Both);
            return Ok(None);
        }

        let channel = &self.config.channel;
        let login = format!(
            "CAP REQ :twitch.tv/tags twitch.tv/commands\r\n\
             PASS SCHMOOPIIE\r\n\
             NICK {}\r\n\
             JOIN #{}\r\n",
            guest_nick(),
            channel
        );
        stream.write_all(login.as_bytes())?;
        stream.flush()?;

        Ok(Some(stream))
    }

    fn read_loop(&self, mut stream: TcpStream) -> io::Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut connected = false;
        let mut awaiting_pong = false;
        // Raw bytes; a timeout can leave half a line here
        let mut buf = Vec::new();

        loop {
            let read = reader.read_until(b'\n', &mut buf);
            if self.stop.load(Ordering::SeqCst) {
                return Ok(());
            }

            match read {
                Ok(0) => {
                    self.lost(connected, "connection closed by server".to_string());
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if is_timeout(&e) && !connected => {
                    self.emit(ChatEventKind::ConnectFailed(
                        "timed out waiting for chat server".to_string(),
                    ));
                    return Err(e);
                }
                Err(e) if is_timeout(&e) && awaiting_pong => {
                    warn!("No reply to keepalive PING, dropping connection");
                    self.lost(connected, "ping timeout".to_string());
                    return Err(e);
                }
                Err(e) if is_timeout(&e) => {
                    debug!("Session {:?} idle, sending keepalive PING", self.id);
                    awaiting_pong = true;
                    if let Err(e) = stream.write_all(b"PING :tmi.twitch.tv\r\n") {
                        self.lost(connected, e.to_string());
                        return Err(e);
                    }
                    continue;
                }
                Err(e) => {
                    self.lost(connected, e.to_string());
                    return Err(e);
                }
            }

            // Anything at all from the server proves the link is alive
            awaiting_pong = false;
            let text = String::from_utf8_lossy(&buf).into_owned();
            buf.clear();

            let Some(line) = IrcLine::parse(&text) else {
                continue;
            };

            match line.command.as_str() {
                "PING" => {
                    let token = line.trailing().unwrap_or("tmi.twitch.tv");
                    stream.write_all(format!("PONG :{}\r\n", token).as_bytes())?;
                }
                "001" => {
                    connected = true;
                    stream.set_read_timeout(Some(self.config.keepalive))?;
                    info!("Connected to Twitch chat #{}", self.config.channel);
                    self.emit(ChatEventKind::Connected);
                }
                "NOTICE" if !connected => {
                    let text = line.trailing().unwrap_or("login rejected").to_string();
                    warn!("Chat server refused login: {}", text);
                    self.emit(ChatEventKind::ConnectFailed(text));
                    return Ok(());
                }
                "RECONNECT" => {
                    self.lost(connected, "server requested reconnect".to_string());
                    return Ok(());
                }
                "PRIVMSG" if connected => {
                    if let Some(message) = message_from_line(&line) {
                        self.emit(ChatEventKind::Message(message));
                    }
                }
                _ => {}
            }
        }
    }

    /// Report a dead socket the way the current phase calls for
    fn lost(&self, connected: bool, reason: String) {
        if connected {
            self.emit(ChatEventKind::Disconnected(Some(reason)));
        } else {
            self.emit(ChatEventKind::ConnectFailed(reason));
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Turn a PRIVMSG line into a message event
pub fn message_from_line(line: &IrcLine) -> Option<MessageEvent> {
    if line.params.len() < 2 {
        return None;
    }
    let username = line.nick()?.to_string();
    let text = line.trailing()?.to_string();
    Some(MessageEvent {
        id: line.tag("id").map(str::to_string),
        username,
        text,
    })
}

/// Anonymous login nick; Twitch accepts any `justinfan<digits>`
fn guest_nick() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("justinfan{}", 10_000 + (nanos ^ std::process::id()) % 90_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("#SamBarefoot "), "sambarefoot");
        assert_eq!(normalize_channel("chan"), "chan");
    }

    #[test]
    fn test_message_from_line() {
        let line = IrcLine::parse(
            "@id=42;display-name=Bob :bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :check this",
        )
        .unwrap();
        let message = message_from_line(&line).unwrap();
        assert_eq!(message.id.as_deref(), Some("42"));
        assert_eq!(message.username, "bob");
        assert_eq!(message.text, "check this");
    }

    #[test]
    fn test_message_without_id() {
        let line = IrcLine::parse(":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :hi").unwrap();
        assert_eq!(message_from_line(&line).unwrap().id, None);
    }

    #[test]
    fn test_guest_nick() {
        let nick = guest_nick();
        assert!(nick.starts_with("justinfan"));
        assert!(nick["justinfan".len()..].parse::<u32>().is_ok());
    }

    #[test]
    fn test_connect_requires_listener() {
        let mut chat = TwitchChat::new(TwitchConfig::new("chan"));
        assert!(chat.connect().is_err());
        assert!(chat.disconnect().is_ok());
    }

    /// Local stand-in for the chat server
    ///
    /// Writes `script` once the client connects, then reads (and records)
    /// whatever the client sends without ever answering.
    fn fake_server(script: &'static [u8]) -> (u16, Arc<Mutex<String>>) {
        use std::io::Read;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&received);
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket.write_all(script).unwrap();
            let mut chunk = [0u8; 512];
            while let Ok(n) = socket.read(&mut chunk) {
                if n == 0 {
                    break;
                }
                sink.lock()
                    .unwrap()
                    .push_str(&String::from_utf8_lossy(&chunk[..n]));
            }
        });
        (port, received)
    }

    fn local_chat(port: u16, keepalive: Duration) -> (TwitchChat, Arc<Mutex<Vec<ChatEventKind>>>) {
        let config = TwitchConfig {
            host: "127.0.0.1".to_string(),
            port,
            channel: "chan".to_string(),
            connect_timeout: Duration::from_secs(2),
            keepalive,
        };
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut chat = TwitchChat::new(config);
        chat.set_listener(Some(Arc::new(move |event: ChatEvent| {
            sink.lock().unwrap().push(event.kind);
        })));
        (chat, events)
    }

    fn wait_for_events(events: &Arc<Mutex<Vec<ChatEventKind>>>, count: usize) -> Vec<ChatEventKind> {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if events.lock().unwrap().len() >= count {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        events.lock().unwrap().clone()
    }

    #[test]
    fn test_silent_server_is_dropped_after_keepalive() {
        let (port, received) = fake_server(b":tmi.twitch.tv 001 justinfan1 :Welcome\r\n");
        let (mut chat, events) = local_chat(port, Duration::from_millis(150));
        chat.connect().unwrap();

        let seen = wait_for_events(&events, 2);
        assert_eq!(
            seen,
            vec![
                ChatEventKind::Connected,
                ChatEventKind::Disconnected(Some("ping timeout".to_string())),
            ]
        );
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !received.lock().unwrap().contains("PING :tmi.twitch.tv") {
            assert!(std::time::Instant::now() < deadline, "no keepalive PING sent");
            thread::sleep(Duration::from_millis(10));
        }
        chat.disconnect().unwrap();
    }

    #[test]
    fn test_invalid_utf8_line_does_not_drop_session() {
        let (port, _received) = fake_server(
            b":tmi.twitch.tv 001 justinfan1 :Welcome\r\n\
              :bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :caf\xff\r\n\
              :bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :next\r\n",
        );
        let (mut chat, events) = local_chat(port, Duration::from_secs(30));
        chat.connect().unwrap();

        let seen = wait_for_events(&events, 3);
        chat.disconnect().unwrap();

        let texts: Vec<String> = seen
            .iter()
            .filter_map(|kind| match kind {
                ChatEventKind::Message(m) => Some(m.text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(seen[0], ChatEventKind::Connected);
        assert_eq!(texts, vec!["caf\u{FFFD}".to_string(), "next".to_string()]);
        assert!(!seen
            .iter()
            .any(|kind| matches!(kind, ChatEventKind::Disconnected(_))));
    }
}
