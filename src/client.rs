//! ## Twitch IRC Client
//!
//! This is the main interface for interacting with Twitch chat.
//! The entrypoint to this module is the [`Client`].
//!
//! The simplest way to get started is using [`Client::connect`] with the default
//! [`Config`], which will connect to Twitch anonymously, followed by joining
//! some channels using [`Client::join`].
//!
//! If you wish to be able to send messages, you have to generate an oauth2 token,
//! and then supply the [`Credentials`] via [`Config::credentials`],
//! or [`Client::builder`] followed by [`ClientBuilder::credentials`].
//!
//! Generating an oauth2 token is out of scope for this library.
//! Head over to the [official documentation](https://dev.twitch.tv/docs/irc/authenticate-bot/#getting-an-access-token)
//! to see how you can generate one.
//!
//! A connection is served by a single background task, which owns the socket.
//! The [`Client`] is a cheap handle to it, and may be cloned freely.
//! The task takes care of:
//! - The handshake (authentication, capability negotiation)
//! - Answering `PING`s, and sending its own to detect a dead connection
//! - Rate limiting `PRIVMSG`s and whispers, with separate budgets for channels
//!   where the account is a moderator
//! - Same message bypass
//! - Matching incoming messages against [expectations](Client::expect)
//!
//! It does _not_ reconnect on its own. When the connection is lost, the
//! [`Events`] stream yields [`Event::Disconnected`], and it is up to the caller
//! to connect again, for example using [`connect_with_retry`].

mod actor;
mod channel;
pub mod conn;
mod event;
mod expectation;
pub mod read;
mod reconnect;
pub mod util;
pub mod write;


pub use self::channel::login as channel_login;
pub use self::event::{Event, Events};
pub use self::expectation::{ExpectError, Expectation, Expectations};
pub use self::read::RecvError;
pub use self::reconnect::{connect_with_retry, Backoff, ReconnectError, ReconnectPolicy, DEFAULT_BACKOFF};
pub use self::write::{truncate_message, SendError, MAX_MESSAGE_LENGTH};

use self::actor::{Connection, Request};
use self::conn::Socket;
use self::util::Timeout;
use crate::expect::{ExpectId, ExpectOptions};
use crate::matcher::Value;
use crate::ratelimit::RateLimiter;
use rand::{thread_rng, Rng};
use serde::Deserialize;
use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite;

/// Credentials used to authenticate to Twitch IRC.
///
/// The [`Default`] impl uses [`Credentials::anon`].
#[derive(Clone, Deserialize)]
pub struct Credentials {
  /// The _login_ of the user.
  #[serde(alias = "username")]
  pub nick: String,

  /// The oauth2 token, with or without the `oauth:` prefix.
  #[serde(alias = "password")]
  pub pass: String,
}

impl Credentials {
  const ANON_RANGE: std::ops::Range<u32> = 10000..99999;

  /// Instantiate credentials from a `nick` and `pass`.
  ///
  /// This does nothing except make it a little more convenient
  /// to construct `Credentials` from various string types.
  pub fn new(nick: impl ToString, pass: impl ToString) -> Self {
    Self {
      nick: nick.to_string(),
      pass: pass.to_string(),
    }
  }

  /// An anonymous login.
  ///
  /// Twitch allows logging in using any username in the form `justinfan?????`
  /// where `?` is any digit. For example, `justinfan11824` is a valid username.
  ///
  /// If you login anonymously, you won't be able to send messages, but you
  /// will still be able to read them, including all the usual tags,
  /// membership commands, etc.
  pub fn anon() -> Self {
    Self {
      pass: "just_a_lil_guy".into(),
      nick: format!("justinfan{}", thread_rng().gen_range(Self::ANON_RANGE)),
    }
  }

  pub fn is_anon(&self) -> bool {
    let Some(digits) = self.nick.strip_prefix("justinfan") else {
      return false;
    };
    let Some(digits) = digits.parse::<u32>().ok() else {
      return false;
    };
    Self::ANON_RANGE.contains(&digits)
  }

  /// The value sent in `PASS`.
  ///
  /// Tokens are sent with the `oauth:` prefix, which is added if missing.
  pub fn token(&self) -> Cow<'_, str> {
    if self.is_anon() || self.pass.starts_with("oauth:") {
      Cow::Borrowed(&self.pass)
    } else {
      Cow::Owned(format!("oauth:{}", self.pass))
    }
  }
}

impl Default for Credentials {
  fn default() -> Self {
    Self::anon()
  }
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("nick", &self.nick)
      .finish_non_exhaustive()
  }
}

/// Message budgets.
///
/// The defaults are Twitch's limits for a regular account.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimits {
  /// Messages per window in channels where we are not a moderator.
  pub user_limit: usize,
  pub user_window_ms: u64,

  /// Minimum time between two messages in channels where we are not a moderator.
  pub message_delay_ms: u64,

  /// Messages per window in channels where we are a moderator.
  pub moderator_limit: usize,
  pub moderator_window_ms: u64,
  pub moderator_delay_ms: u64,

  pub whisper_per_second: usize,
  pub whisper_per_minute: usize,

  /// How many messages each queue may hold. Messages beyond this are dropped.
  pub queue_size: Option<usize>,
}

impl Default for RateLimits {
  fn default() -> Self {
    Self {
      user_limit: 20,
      user_window_ms: 30_000,
      message_delay_ms: 1_500,
      moderator_limit: 100,
      moderator_window_ms: 30_000,
      moderator_delay_ms: 0,
      whisper_per_second: 3,
      whisper_per_minute: 100,
      queue_size: None,
    }
  }
}

impl RateLimits {
  pub fn user(&self) -> RateLimiter {
    RateLimiter::new(self.user_limit, Duration::from_millis(self.user_window_ms))
      .with_delay(Duration::from_millis(self.message_delay_ms))
  }

  pub fn moderator(&self) -> RateLimiter {
    RateLimiter::new(
      self.moderator_limit,
      Duration::from_millis(self.moderator_window_ms),
    )
    .with_delay(Duration::from_millis(self.moderator_delay_ms))
  }

  pub fn whisper(&self) -> [RateLimiter; 2] {
    [
      RateLimiter::new(self.whisper_per_second, Duration::from_secs(1)),
      RateLimiter::new(self.whisper_per_minute, Duration::from_secs(60)),
    ]
  }
}

/// Client configuration.
///
/// Every field has a default, so a config can be loaded from a partial
/// JSON document:
///
/// ```rust
/// let config: nmb_tmi::Config = serde_json::from_str(r#"{
///   "credentials": { "username": "bot", "password": "oauth:abc" },
///   "rate_limits": { "message_delay_ms": 1200 }
/// }"#).unwrap();
/// assert_eq!(config.credentials.nick, "bot");
/// assert_eq!(config.rate_limits.user_limit, 20);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Credentials to use when logging in to Twitch IRC.
  pub credentials: Credentials,

  pub url: String,

  /// How long the WebSocket handshake and the IRC handshake may take, each.
  pub connect_timeout_ms: u64,

  /// Base interval between keepalive `PING`s.
  pub ping_interval_ms: u64,

  /// Random spread applied to each keepalive interval.
  pub ping_jitter_ms: u64,

  /// How long to wait for the `PONG` before giving up on the connection.
  pub pong_timeout_ms: u64,

  pub rate_limits: RateLimits,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      credentials: Credentials::default(),
      url: conn::URL.into(),
      connect_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
      ping_interval_ms: 5 * 60 * 1000,
      ping_jitter_ms: 30 * 1000,
      pong_timeout_ms: 15 * 60 * 1000,
      rate_limits: RateLimits::default(),
    }
  }
}

impl Config {
  /// Instantiate a config from some `credentials`.
  pub fn new(credentials: Credentials) -> Self {
    Self {
      credentials,
      ..Default::default()
    }
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  pub fn ping_interval(&self) -> Duration {
    Duration::from_millis(self.ping_interval_ms)
  }

  pub fn ping_jitter(&self) -> Duration {
    Duration::from_millis(self.ping_jitter_ms)
  }

  pub fn pong_timeout(&self) -> Duration {
    Duration::from_millis(self.pong_timeout_ms)
  }
}

/// The default timeout used when connecting to Twitch IRC.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for a [`Client`].
pub struct ClientBuilder {
  config: Config,
}

impl ClientBuilder {
  /// Set the credentials.
  pub fn credentials(mut self, credentials: Credentials) -> Self {
    self.config.credentials = credentials;
    self
  }

  pub fn url(mut self, url: impl Into<String>) -> Self {
    self.config.url = url.into();
    self
  }

  pub fn rate_limits(mut self, rate_limits: RateLimits) -> Self {
    self.config.rate_limits = rate_limits;
    self
  }

  pub fn connect_timeout(mut self, timeout: Duration) -> Self {
    self.config.connect_timeout_ms = timeout.as_millis() as u64;
    self
  }

  /// Send a keepalive `PING` every `interval`, give or take `jitter`.
  pub fn ping_interval(mut self, interval: Duration, jitter: Duration) -> Self {
    self.config.ping_interval_ms = interval.as_millis() as u64;
    self.config.ping_jitter_ms = jitter.as_millis() as u64;
    self
  }

  pub fn pong_timeout(mut self, timeout: Duration) -> Self {
    self.config.pong_timeout_ms = timeout.as_millis() as u64;
    self
  }

  pub fn config(self) -> Config {
    self.config
  }

  /// Attempts to connect to Twitch IRC using this configuration.
  pub fn connect(self) -> impl Future<Output = Result<(Client, Events), ConnectError>> {
    Client::connect(self.config)
  }

  /// Perform the handshake over an already open `socket`.
  pub fn connect_with_socket<S: Socket>(
    self,
    socket: S,
  ) -> impl Future<Output = Result<(Client, Events), ConnectError>> {
    Client::connect_with_socket(self.config, socket)
  }
}

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
  /// The socket is gone.
  Disconnected,
  /// The socket is being opened.
  Connecting,
  /// The socket is open, and we are waiting for Twitch to accept the login.
  Connected,
  /// Twitch accepted the login.
  Ready,
}

/// How much of a queue's budget is left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Budget {
  /// Messages which could be sent right now.
  pub remaining: usize,
  /// Messages waiting in the queue.
  pub queued: usize,
}

/// Snapshot of every outgoing queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateLimitStatus {
  pub user: Budget,
  pub moderator: Budget,
  pub whisper: Budget,
}

/// Twitch IRC client.
///
/// This is a handle to a connection task. Cloning it is cheap, and all clones
/// talk to the same connection. The connection closes when [`Client::close`]
/// is called, or when every handle is dropped.
///
/// Methods which send something only queue a request for the connection task,
/// and return immediately. They fail only if the connection is already gone.
#[derive(Clone, Debug)]
pub struct Client {
  requests: mpsc::UnboundedSender<Request>,
  state: watch::Receiver<ConnectionState>,
  credentials: Credentials,
}

impl Client {
  /// The [`ClientBuilder`] provides a builder for setting up the client configuration.
  pub fn builder() -> ClientBuilder {
    ClientBuilder {
      config: Default::default(),
    }
  }

  /// Open a WebSocket to `config.url`, and perform the handshake.
  ///
  /// Resolves once Twitch accepts the login.
  pub async fn connect(config: Config) -> Result<(Client, Events), ConnectError> {
    trace!("connecting");
    let socket = conn::open(&config.url)
      .timeout(config.connect_timeout())
      .await??;
    Self::connect_with_socket(config, socket).await
  }

  /// Perform the handshake over an already open `socket`.
  ///
  /// Resolves once Twitch accepts the login.
  pub async fn connect_with_socket<S: Socket>(
    config: Config,
    socket: S,
  ) -> Result<(Client, Events), ConnectError> {
    let (requests, requests_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(ConnectionState::Connecting);
    let (ready_tx, ready_rx) = oneshot::channel();

    let timeout = config.connect_timeout();
    let client = Client {
      requests,
      state,
      credentials: config.credentials.clone(),
    };

    let connection = Connection::new(config, socket, requests_rx, events_tx, state_tx, ready_tx);
    tokio::spawn(connection.run());

    match ready_rx.timeout(timeout).await {
      Ok(Ok(Ok(()))) => Ok((client, Events::new(events_rx))),
      Ok(Ok(Err(e))) => Err(e),
      Ok(Err(_)) => Err(ConnectError::Closed),
      Err(_) => {
        trace!("handshake timed out");
        client.close();
        Err(ConnectError::Timeout)
      }
    }
  }

  fn request(&self, request: Request) -> Result<(), SendError> {
    self.requests.send(request).map_err(|_| SendError::Closed)
  }

  /// Join a channel.
  pub fn join(&self, channel: impl Into<String>) -> Result<(), SendError> {
    self.request(Request::Join(vec![channel.into()]))
  }

  /// Join many channels with a single `JOIN`.
  pub fn join_all<I>(&self, channels: I) -> Result<(), SendError>
  where
    I: IntoIterator,
    I::Item: Into<String>,
  {
    self.request(Request::Join(channels.into_iter().map(Into::into).collect()))
  }

  /// Leave a channel.
  pub fn part(&self, channel: impl Into<String>) -> Result<(), SendError> {
    self.request(Request::Part(vec![channel.into()]))
  }

  /// Leave many channels with a single `PART`.
  pub fn part_all<I>(&self, channels: I) -> Result<(), SendError>
  where
    I: IntoIterator,
    I::Item: Into<String>,
  {
    self.request(Request::Part(channels.into_iter().map(Into::into).collect()))
  }

  /// Send a chat message to `channel`.
  ///
  /// The message goes through the moderator queue if we are a moderator in
  /// `channel`, and through the shared user queue otherwise.
  pub fn chat(&self, channel: impl Into<String>, text: impl Into<String>) -> Result<(), SendError> {
    self.privmsg(channel.into(), text.into(), None)
  }

  /// Reply to the message with id `parent`.
  pub fn reply(
    &self,
    channel: impl Into<String>,
    parent: impl Into<String>,
    text: impl Into<String>,
  ) -> Result<(), SendError> {
    self.privmsg(channel.into(), text.into(), Some(parent.into()))
  }

  fn privmsg(&self, channel: String, text: String, reply_to: Option<String>) -> Result<(), SendError> {
    if self.is_anon() {
      return Err(SendError::Anonymous);
    }
    self.request(Request::Chat {
      channel,
      text,
      reply_to,
    })
  }

  /// Whisper to `user`.
  pub fn whisper(&self, user: impl Into<String>, text: impl Into<String>) -> Result<(), SendError> {
    if self.is_anon() {
      return Err(SendError::Anonymous);
    }
    self.request(Request::Whisper {
      user: user.into(),
      text: text.into(),
    })
  }

  /// Send a line as-is, without going through any queue.
  pub fn send_raw(&self, line: impl Into<String>) -> Result<(), SendError> {
    self.request(Request::Raw(line.into()))
  }

  /// Tell the connection whether we are a moderator in `channel`.
  ///
  /// Twitch also reports this in `USERSTATE`, which takes precedence once received.
  pub fn set_moderator(&self, channel: impl Into<String>, moderator: bool) -> Result<(), SendError> {
    self.request(Request::SetModerator {
      channel: channel.into(),
      moderator,
    })
  }

  /// Wait for the first message which matches `pattern`.
  ///
  /// The registration is in place once this resolves, so it is safe to send
  /// whatever the expected message is a response to afterwards.
  ///
  /// ```rust,no_run
  /// # async fn run(client: nmb_tmi::Client) -> anyhow::Result<()> {
  /// use nmb_tmi::expect::ExpectOptions;
  /// use serde_json::json;
  /// use std::time::Duration;
  ///
  /// let roomstate = client
  ///   .expect(
  ///     json!({ "cmd": "ROOMSTATE", "params": ["#forsen"] }),
  ///     ExpectOptions::default().timeout(Duration::from_secs(10)),
  ///   )
  ///   .await?;
  /// client.join("forsen")?;
  /// let message = roomstate.await?;
  /// # Ok(())
  /// # }
  /// ```
  pub async fn expect(
    &self,
    pattern: impl Into<Value>,
    options: ExpectOptions,
  ) -> Result<Expectation, SendError> {
    let (tx, rx) = oneshot::channel();
    let (id_tx, id_rx) = oneshot::channel();
    self.request(Request::Expect {
      pattern: pattern.into(),
      options,
      tx,
      id: id_tx,
    })?;
    let id = id_rx.await.map_err(|_| SendError::Closed)?;
    Ok(Expectation::new(id, rx, self.requests.clone()))
  }

  /// Receive every message which matches `pattern`, until the timeout in
  /// `options` elapses or the returned [`Expectations`] is dropped.
  pub async fn expect_all(
    &self,
    pattern: impl Into<Value>,
    options: ExpectOptions,
  ) -> Result<Expectations, SendError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (id_tx, id_rx) = oneshot::channel();
    self.request(Request::ExpectAll {
      pattern: pattern.into(),
      options,
      tx,
      id: id_tx,
    })?;
    let id = id_rx.await.map_err(|_| SendError::Closed)?;
    Ok(Expectations::new(id, rx, self.requests.clone()))
  }

  /// Remove an expectation by id.
  ///
  /// Resolves once the connection has removed it, so no message received
  /// afterwards can reach it. Unknown ids are ignored.
  pub async fn un_expect(&self, id: ExpectId) -> Result<(), SendError> {
    let (tx, rx) = oneshot::channel();
    self.request(Request::UnExpect(id, Some(tx)))?;
    rx.await.map_err(|_| SendError::Closed)
  }

  /// The remaining budget and queue length of every outgoing queue.
  pub async fn rate_limits(&self) -> Result<RateLimitStatus, SendError> {
    let (tx, rx) = oneshot::channel();
    self.request(Request::RateLimits(tx))?;
    rx.await.map_err(|_| SendError::Closed)
  }

  /// Close the connection. Queued messages are discarded.
  pub fn close(&self) {
    let _ = self.request(Request::Close);
  }

  /// Wait until the connection is gone.
  pub async fn closed(&self) {
    let mut state = self.state.clone();
    while *state.borrow_and_update() != ConnectionState::Disconnected {
      if state.changed().await.is_err() {
        break;
      }
    }
  }

  pub fn state(&self) -> ConnectionState {
    *self.state.borrow()
  }

  #[inline]
  pub fn credentials(&self) -> &Credentials {
    &self.credentials
  }

  #[inline]
  pub fn is_anon(&self) -> bool {
    self.credentials.is_anon()
  }
}

static_assert_send!(Client);
static_assert_sync!(Client);

/// An error which occurred while attempting to connect to Twitch IRC.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
  /// Failed to open the WebSocket.
  #[error("failed to connect: {0}")]
  Ws(#[from] tungstenite::Error),

  /// The connection failed during the handshake.
  #[error("failed to connect: {0}")]
  Recv(RecvError),

  /// Connection timed out.
  #[error("failed to connect: connection timed out")]
  Timeout,

  /// Failed to connect because of invalid credentials.
  #[error("failed to connect: invalid credentials ({0})")]
  Auth(String),

  /// The connection closed before the handshake completed.
  #[error("failed to connect: connection closed")]
  Closed,
}

impl ConnectError {
  /// Returns `true` if connecting again may succeed.
  pub fn should_retry(&self) -> bool {
    !matches!(self, Self::Auth(_))
  }
}

impl From<RecvError> for ConnectError {
  fn from(value: RecvError) -> Self {
    match value {
      RecvError::Auth(notice) => Self::Auth(notice),
      other => Self::Recv(other),
    }
  }
}

impl From<tokio::time::error::Elapsed> for ConnectError {
  fn from(_: tokio::time::error::Elapsed) -> Self {
    Self::Timeout
  }
}
