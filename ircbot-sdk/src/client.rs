//! IRC client for bots and scripts.
//!
//! This is the main entry point for SDK consumers. It manages the TCP
//! connection, optional TLS, IRC registration and keepalive, and emits
//! [`Event`]s on a channel. Outgoing traffic goes through a cloneable
//! [`ClientHandle`].
//!
//! ## Reconnection
//!
//! A single session ends when the server closes the connection. Use
//! [`run_with_reconnect`] to keep a bot online: it reconnects with
//! exponential backoff (2→4→8→16→30s cap), rejoins the configured
//! channels and sends QUIT when its shutdown future resolves.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::event::Event;
use crate::irc::{self, Ctcp, Message};

/// How many times a taken nick gets an extra `_` before we give up.
const MAX_NICK_RETRIES: u32 = 5;
/// Send a client PING after this much silence from the server.
const PING_INTERVAL: Duration = Duration::from_secs(60);
/// Drop the session after this much silence.
const PING_TIMEOUT: Duration = Duration::from_secs(120);
/// How long to wait for the server to close the link after our QUIT.
const QUIT_GRACE: Duration = Duration::from_secs(5);
/// Longest inbound line we accept, tags included.
const MAX_LINE_LEN: usize = 8192;
/// Commands held back until registration; later ones are dropped.
const MAX_PENDING: usize = 64;

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Server password, sent as PASS before registration when non-empty.
    pub password: Option<String>,
    /// Use TLS.
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "ircbot".to_string(),
            user: "ircbot".to_string(),
            realname: "ircbot".to_string(),
            password: None,
            tls: false,
            tls_insecure: false,
        }
    }
}

impl ConnectConfig {
    /// TLS is used when asked for, or implied by the conventional port 6697.
    pub fn use_tls(&self) -> bool {
        self.tls || self.server_addr.ends_with(":6697")
    }

    /// Host part of `server_addr`, without port or IPv6 brackets.
    pub fn host(&self) -> &str {
        let host = match self.server_addr.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => self.server_addr.as_str(),
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }
}

/// A channel to join, with an optional key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub key: Option<String>,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key: None,
        }
    }

    pub fn with_key(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            key: Some(key.to_string()).filter(|k| !k.is_empty()),
        }
    }
}

/// Commands the consumer can send to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { channel: String, key: Option<String> },
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Nick(String),
    Raw(String),
    Quit(Option<String>),
}

/// A handle to a running IRC client connection.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// Wrap a command sender. Sessions build their own; this is handy for
    /// driving a [`crate::bot::Bot`] without a server.
    pub fn new(cmd_tx: mpsc::Sender<Command>) -> Self {
        Self { cmd_tx }
    }

    pub async fn join(&self, channel: &str) -> Result<()> {
        self.send(Command::Join {
            channel: channel.to_string(),
            key: None,
        })
        .await
    }

    /// Join a channel, passing its key when it has one.
    pub async fn join_channel(&self, channel: &Channel) -> Result<()> {
        self.send(Command::Join {
            channel: channel.name.clone(),
            key: channel.key.clone(),
        })
        .await
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.send(Command::Privmsg {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn notice(&self, target: &str, text: &str) -> Result<()> {
        self.send(Command::Notice {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn nick(&self, nick: &str) -> Result<()> {
        self.send(Command::Nick(nick.to_string())).await
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.send(Command::Raw(line.to_string())).await
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.send(Command::Quit(message.map(|s| s.to_string()))).await
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("IRC session is closed"))
    }
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl EstablishedConnection {
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self {
            Self::Plain(tcp) => tcp.peer_addr(),
            Self::Tls(tls) => tls.get_ref().0.peer_addr(),
        }
    }
}

/// Establish TCP (and optionally TLS) connection to the server.
pub async fn establish_connection(config: &ConnectConfig) -> Result<EstablishedConnection> {
    let use_tls = config.use_tls();
    let mode = if use_tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {}...", config.server_addr);
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .with_context(|| format!("TCP connect to {} failed", config.server_addr))?;
    let peer = tcp
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| config.server_addr.clone());
    tracing::info!(peer = %peer, mode, "Connected");

    if !use_tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    let tls_config = if config.tls_insecure {
        tracing::debug!("TLS: insecure mode (skipping cert verification)");
        rustls_insecure_config()
    } else {
        rustls_default_config()
    };
    let connector = TlsConnector::from(Arc::new(tls_config));
    let dns_name = rustls::pki_types::ServerName::try_from(config.host().to_string())
        .with_context(|| format!("invalid TLS server name {:?}", config.host()))?;
    let tls = connector
        .connect(dns_name, tcp)
        .await
        .with_context(|| format!("TLS handshake with {} failed", config.server_addr))?;
    tracing::debug!("TLS handshake complete");
    Ok(EstablishedConnection::Tls(Box::new(tls)))
}

/// Connect using an already-established connection.
///
/// Returns a handle for sending commands and a receiver for events.
/// The IRC protocol runs in a spawned task.
pub fn connect_with_stream(
    conn: EstablishedConnection,
    config: ConnectConfig,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(1024);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let peer = conn
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| config.server_addr.clone());

    tokio::spawn(async move {
        tracing::debug!(peer = %peer, nick = %config.nick, "IRC session started");
        let _ = event_tx.send(Event::Connected).await;
        let result = match conn {
            EstablishedConnection::Plain(tcp) => {
                let (reader, writer) = tokio::io::split(tcp);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
            EstablishedConnection::Tls(tls) => {
                let (reader, writer) = tokio::io::split(*tls);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
        };
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: format!("{e:#}"),
                    requested: false,
                })
                .await;
        }
    });

    (ClientHandle::new(cmd_tx), event_rx)
}

/// Connect to an IRC server and run the client.
///
/// Connection errors surface as [`Event::Disconnected`]; prefer
/// `establish_connection` + `connect_with_stream` to see them as `Err`.
pub fn connect(config: ConnectConfig) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(1024);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);

    tokio::spawn(async move {
        let result: Result<()> = async {
            let conn = establish_connection(&config).await?;
            let _ = event_tx.send(Event::Connected).await;
            match conn {
                EstablishedConnection::Plain(tcp) => {
                    let (reader, writer) = tokio::io::split(tcp);
                    run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
                }
                EstablishedConnection::Tls(tls) => {
                    let (reader, writer) = tokio::io::split(*tls);
                    run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
                }
            }
        }
        .await;
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: format!("{e:#}"),
                    requested: false,
                })
                .await;
        }
    });

    (ClientHandle::new(cmd_tx), event_rx)
}

fn install_crypto_provider() {
    // ring is preferred when both providers are compiled in.
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

fn rustls_default_config() -> rustls::ClientConfig {
    install_crypto_provider();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn rustls_insecure_config() -> rustls::ClientConfig {
    install_crypto_provider();
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth()
}

/// Certificate verifier for `tls_insecure`: accepts whatever the server presents.
#[derive(Debug)]
struct AcceptAnyCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}

/// Write one message followed by CRLF.
async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    tracing::trace!(line = %msg, "send");
    writer.write_all(format!("{msg}\r\n").as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Run one IRC session over an established stream until it closes.
pub(crate) async fn run_irc<R, W>(
    mut reader: R,
    mut writer: W,
    config: &ConnectConfig,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
        send_line(&mut writer, &Message::new("PASS", vec![password.to_string()])).await?;
    }
    send_line(&mut writer, &Message::new("NICK", vec![config.nick.clone()])).await?;
    send_line(
        &mut writer,
        &Message::new(
            "USER",
            vec![
                config.user.clone(),
                "0".to_string(),
                "*".to_string(),
                config.realname.clone(),
            ],
        ),
    )
    .await?;

    let mut registered = false;
    let mut quitting = false;
    let mut current_nick = config.nick.clone();
    let mut nick_tries: u32 = 0;
    let mut pending_commands: Vec<Command> = Vec::new();
    let mut line_buf: Vec<u8> = Vec::new();
    let mut last_activity = Instant::now();
    let mut ping_sent = false;

    loop {
        let deadline = if ping_sent {
            last_activity + PING_TIMEOUT
        } else {
            last_activity + PING_INTERVAL
        };

        // One byte over the cap is enough to tell an overlong line apart.
        let budget = (MAX_LINE_LEN + 1).saturating_sub(line_buf.len()) as u64;
        let mut limited = (&mut reader).take(budget);

        tokio::select! {
            result = limited.read_until(b'\n', &mut line_buf) => {
                let n = result?;
                if line_buf.len() > MAX_LINE_LEN {
                    tracing::warn!(len = line_buf.len(), "Inbound line too long, dropping link");
                    let _ = event_tx.send(Event::Disconnected {
                        reason: "Line too long".to_string(),
                        requested: false,
                    }).await;
                    break;
                }
                if n == 0 {
                    let _ = event_tx.send(Event::Disconnected {
                        reason: "Connection closed by server".to_string(),
                        requested: quitting,
                    }).await;
                    break;
                }

                last_activity = Instant::now();
                ping_sent = false;
                let line = String::from_utf8_lossy(&line_buf).into_owned();
                line_buf.clear();
                let raw = line.trim_end().to_string();
                if raw.is_empty() {
                    continue;
                }
                tracing::trace!(line = %raw, "recv");
                let _ = event_tx.send(Event::RawLine(raw)).await;

                let Some(msg) = Message::parse(&line) else {
                    tracing::debug!(line = %line.trim_end(), "Unparseable line");
                    continue;
                };

                match msg.command.as_str() {
                    // ERR_NICKNAMEINUSE
                    "433" if !registered => {
                        nick_tries += 1;
                        if nick_tries > MAX_NICK_RETRIES {
                            let _ = event_tx.send(Event::Disconnected {
                                reason: format!("Nickname {current_nick} is in use"),
                                requested: false,
                            }).await;
                            break;
                        }
                        let retry = format!("{current_nick}_");
                        let _ = event_tx.send(Event::NickInUse {
                            attempted: current_nick.clone(),
                            retry: retry.clone(),
                        }).await;
                        send_line(&mut writer, &Message::new("NICK", vec![retry.clone()])).await?;
                        current_nick = retry;
                    }
                    // RPL_WELCOME
                    "001" => {
                        if let Some(nick) = msg.params.first().filter(|n| !n.is_empty()) {
                            current_nick = nick.clone();
                        }
                        registered = true;
                        let _ = event_tx.send(Event::Registered { nick: current_nick.clone() }).await;
                        for cmd in pending_commands.drain(..) {
                            execute_command(&mut writer, cmd).await?;
                        }
                    }
                    "PING" => {
                        let token = msg.params.first().cloned().unwrap_or_default();
                        send_line(&mut writer, &Message::new("PONG", vec![token])).await?;
                    }
                    "PONG" => {}
                    "JOIN" => {
                        let channel = msg.params.first().cloned().unwrap_or_default();
                        let nick = msg.nick().unwrap_or_default().to_string();
                        let _ = event_tx.send(Event::Joined { channel, nick }).await;
                    }
                    "PART" => {
                        let channel = msg.params.first().cloned().unwrap_or_default();
                        let nick = msg.nick().unwrap_or_default().to_string();
                        let _ = event_tx.send(Event::Parted { channel, nick }).await;
                    }
                    "KICK" => {
                        if msg.params.len() >= 2 {
                            let _ = event_tx.send(Event::Kicked {
                                channel: msg.params[0].clone(),
                                nick: msg.params[1].clone(),
                                by: msg.nick().unwrap_or("server").to_string(),
                                reason: msg.params.get(2).cloned().unwrap_or_default(),
                            }).await;
                        }
                    }
                    "NICK" => {
                        let old_nick = msg.nick().unwrap_or_default().to_string();
                        let new_nick = msg.params.first().cloned().unwrap_or_default();
                        if !old_nick.is_empty() && !new_nick.is_empty() {
                            if old_nick.eq_ignore_ascii_case(&current_nick) {
                                current_nick = new_nick.clone();
                            }
                            let _ = event_tx.send(Event::NickChanged { old_nick, new_nick }).await;
                        }
                    }
                    "QUIT" => {
                        let nick = msg.nick().unwrap_or_default().to_string();
                        let reason = msg.params.first().cloned().unwrap_or_default();
                        let _ = event_tx.send(Event::UserQuit { nick, reason }).await;
                    }
                    "PRIVMSG" | "NOTICE" => {
                        if msg.params.len() < 2 {
                            continue;
                        }
                        let text = msg.params[1].clone();
                        if msg.command == "NOTICE" && !msg.from_user() {
                            let _ = event_tx.send(Event::ServerNotice { text }).await;
                            continue;
                        }
                        let from = msg.nick().unwrap_or_default().to_string();
                        let target = msg.params[0].clone();
                        let event = if msg.command == "NOTICE" {
                            Event::Notice { from, target, text }
                        } else if let Some(ctcp) = Ctcp::parse(&text) {
                            Event::Ctcp {
                                from,
                                target,
                                command: ctcp.command,
                                args: ctcp.args,
                            }
                        } else {
                            Event::Message { from, target, text, tags: msg.tags }
                        };
                        let _ = event_tx.send(event).await;
                    }
                    "ERROR" => {
                        let text = msg.params.join(" ");
                        let _ = event_tx.send(Event::ServerNotice { text }).await;
                    }
                    // Join refusals: no such channel, too many channels, full,
                    // invite only, banned, bad key.
                    "403" | "405" | "471" | "473" | "474" | "475" => {
                        if let Some(channel) = msg.params.get(1) {
                            let _ = event_tx.send(Event::JoinFailed {
                                channel: channel.clone(),
                                code: msg.command.parse().unwrap_or_default(),
                                reason: msg.params.last().cloned().unwrap_or_default(),
                            }).await;
                        }
                    }
                    _ => {
                        // Remaining error numerics go out as notices so the
                        // consumer can log them.
                        if let Ok(num) = msg.command.parse::<u16>()
                            && (400..600).contains(&num)
                        {
                            let text = if msg.params.len() > 1 {
                                msg.params[1..].join(" ")
                            } else {
                                msg.params.join(" ")
                            };
                            let _ = event_tx.send(Event::ServerNotice { text }).await;
                        }
                    }
                }
            }
            Some(cmd) = cmd_rx.recv() => {
                let is_quit = matches!(cmd, Command::Quit(_));
                if registered || is_quit {
                    quitting |= is_quit;
                    execute_command(&mut writer, cmd).await?;
                } else if pending_commands.len() < MAX_PENDING {
                    // Servers drop most commands before 001, so hold them.
                    pending_commands.push(cmd);
                } else {
                    tracing::warn!(?cmd, "Not registered yet and queue is full, dropping command");
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                if ping_sent {
                    let _ = event_tx.send(Event::Disconnected {
                        reason: "Ping timeout".to_string(),
                        requested: false,
                    }).await;
                    break;
                }
                send_line(&mut writer, &Message::new("PING", vec!["keepalive".to_string()])).await?;
                ping_sent = true;
            }
        }
    }

    Ok(())
}

/// Execute a single IRC command on the wire.
async fn execute_command<W: AsyncWrite + Unpin>(writer: &mut W, cmd: Command) -> Result<()> {
    let msg = match cmd {
        Command::Join { channel, key } => {
            let mut params = vec![irc::sanitize(&channel)];
            params.extend(key.map(|k| irc::sanitize(&k)));
            Message::new("JOIN", params)
        }
        Command::Privmsg { target, text } => {
            Message::new("PRIVMSG", vec![irc::sanitize(&target), irc::sanitize(&text)])
        }
        Command::Notice { target, text } => {
            Message::new("NOTICE", vec![irc::sanitize(&target), irc::sanitize(&text)])
        }
        Command::Nick(nick) => Message::new("NICK", vec![irc::sanitize(&nick)]),
        Command::Raw(line) => {
            let line = irc::sanitize(&line);
            tracing::trace!(line = %line, "send");
            writer.write_all(format!("{line}\r\n").as_bytes()).await?;
            writer.flush().await?;
            return Ok(());
        }
        Command::Quit(reason) => {
            Message::new("QUIT", reason.map(|r| irc::sanitize(&r)).into_iter().collect())
        }
    };
    send_line(writer, &msg).await
}

// ── Reconnect helper ──

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
    /// Channels to join after every registration.
    pub channels: Vec<Channel>,
    /// QUIT reason sent on shutdown.
    pub quit_message: String,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            channels: Vec::new(),
            quit_message: "Shutting down.".to_string(),
        }
    }
}

/// Exponential backoff with up to 25% jitter.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: config.initial_delay,
            max: config.max_delay,
            factor: config.backoff_factor.max(1.0),
            current: config.initial_delay,
            attempts: 0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.attempts += 1;
        let base_ms = delay.as_millis() as u64;
        let grown = (base_ms as f64 * self.factor) as u64 + rand_jitter(base_ms / 4);
        self.current = Duration::from_millis(grown).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}

fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..max)
}

/// Boxed event handler future, as returned by [`run_with_reconnect`] handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Run an event loop with automatic reconnection.
///
/// The `handler` is called for each event. When disconnected, the loop
/// reconnects with exponential backoff and rejoins configured channels.
///
/// Returns `Ok(())` once `shutdown` resolves (after sending QUIT if a
/// session is up) or when the session ends because of a QUIT we sent.
///
/// # Example
///
/// ```rust,no_run
/// use ircbot_sdk::client::{Channel, ConnectConfig, ReconnectConfig, run_with_reconnect};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = ConnectConfig { nick: "ircbot".into(), ..Default::default() };
/// let reconnect = ReconnectConfig {
///     channels: vec![Channel::new("#bots")],
///     ..Default::default()
/// };
///
/// let shutdown = async {
///     let _ = tokio::signal::ctrl_c().await;
/// };
/// run_with_reconnect(config, reconnect, shutdown, |handle, event| {
///     Box::pin(async move {
///         // handle event
///         Ok(())
///     })
/// }).await
/// # }
/// ```
pub async fn run_with_reconnect<F, S>(
    config: ConnectConfig,
    reconnect_config: ReconnectConfig,
    shutdown: S,
    handler: F,
) -> Result<()>
where
    F: Fn(ClientHandle, Event) -> HandlerFuture + Send + Sync,
    S: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    let mut backoff = Backoff::new(&reconnect_config);

    loop {
        let connected = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested while offline");
                return Ok(());
            }
            result = establish_connection(&config) => result,
        };

        let conn = match connected {
            Ok(conn) => conn,
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %format!("{e:#}"),
                    attempt = backoff.attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Connection failed, retrying"
                );
                tokio::select! {
                    _ = &mut shutdown => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }
        };

        let (handle, mut events) = connect_with_stream(conn, config.clone());
        let mut requested_quit = false;

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => {
                    return quit_and_drain(&handle, &mut events, &reconnect_config, &handler).await;
                }
                event = events.recv() => event,
            };
            let Some(event) = event else { break };

            match &event {
                Event::Registered { .. } => {
                    backoff.reset();
                    join_channels(&handle, &reconnect_config.channels).await;
                }
                Event::Disconnected { requested, .. } => requested_quit = *requested,
                _ => {}
            }

            let done = matches!(event, Event::Disconnected { .. });
            if let Err(e) = handler(handle.clone(), event).await {
                tracing::error!(error = %format!("{e:#}"), "Handler error");
            }
            if done {
                break;
            }
        }

        if requested_quit {
            tracing::info!("Session closed after QUIT");
            return Ok(());
        }

        let delay = backoff.next_delay();
        tracing::info!(delay_ms = delay.as_millis() as u64, "Disconnected, will reconnect");
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn join_channels(handle: &ClientHandle, channels: &[Channel]) {
    if channels.is_empty() {
        return;
    }
    let mut names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
    names.sort_unstable();
    tracing::info!(channels = %names.join(", "), "Channels to join");
    for channel in channels {
        if let Err(e) = handle.join_channel(channel).await {
            tracing::warn!(channel = %channel.name, error = %e, "JOIN not sent");
        }
    }
}

async fn quit_and_drain<F>(
    handle: &ClientHandle,
    events: &mut mpsc::Receiver<Event>,
    reconnect_config: &ReconnectConfig,
    handler: &F,
) -> Result<()>
where
    F: Fn(ClientHandle, Event) -> HandlerFuture + Send + Sync,
{
    if let Err(e) = handle.quit(Some(&reconnect_config.quit_message)).await {
        tracing::debug!(error = %e, "QUIT not sent");
        return Ok(());
    }

    let drain = async {
        while let Some(event) = events.recv().await {
            let done = matches!(event, Event::Disconnected { .. });
            if let Err(e) = handler(handle.clone(), event).await {
                tracing::error!(error = %format!("{e:#}"), "Handler error");
            }
            if done {
                break;
            }
        }
    };
    if tokio::time::timeout(QUIT_GRACE, drain).await.is_err() {
        tracing::warn!("Server did not close the link after QUIT");
    }
    Ok(())
}
