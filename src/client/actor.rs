//! The task which owns a connection.
//!
//! Everything that touches the socket happens here, so none of the state
//! needs a lock. The task waits on whichever comes first:
//! - a frame from Twitch
//! - a request from a [`Client`][super::Client] handle
//! - one of the outgoing queues becoming ready
//! - an expectation deadline
//! - the keepalive timer

use super::channel::{self, Channel};
use super::conn::Socket;
use super::event::Event;
use super::expectation::{all_callback, once_callback, OnceSender};
use super::read::{self, RecvError};
use super::util::{jitter, sleep_until};
use super::{write, Budget, Config, ConnectError, ConnectionState, RateLimitStatus};
use crate::expect::{ExpectId, ExpectOptions, Expector, Outcome};
use crate::irc::{Command, IrcMessage};
use crate::matcher::{MatchOptions, Value};
use crate::ratelimit::Queue;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};

#[derive(Debug)]
pub(crate) enum Request {
  Join(Vec<String>),
  Part(Vec<String>),
  Chat {
    channel: String,
    text: String,
    reply_to: Option<String>,
  },
  Whisper {
    user: String,
    text: String,
  },
  Raw(String),
  SetModerator {
    channel: String,
    moderator: bool,
  },
  Expect {
    pattern: Value,
    options: ExpectOptions,
    tx: OnceSender,
    id: oneshot::Sender<ExpectId>,
  },
  ExpectAll {
    pattern: Value,
    options: ExpectOptions,
    tx: mpsc::UnboundedSender<IrcMessage>,
    id: oneshot::Sender<ExpectId>,
  },
  /// Acknowledged once the entry is gone, if a sender is given.
  UnExpect(ExpectId, Option<oneshot::Sender<()>>),
  RateLimits(oneshot::Sender<RateLimitStatus>),
  Close,
}

#[derive(Debug)]
enum Outbound {
  Chat {
    channel: String,
    text: String,
    reply_to: Option<String>,
  },
  Whisper {
    user: String,
    text: String,
  },
}

/// Sent to the task by its own expectation callbacks.
enum Internal {
  Pong { sent_at: Instant },
  PongMissing(Duration),
}

#[derive(Clone, Copy, Debug)]
enum Class {
  User,
  Moderator,
  Whisper,
}

pub(crate) struct Connection<S> {
  socket: S,
  config: Config,
  requests: mpsc::UnboundedReceiver<Request>,
  events: mpsc::UnboundedSender<Event>,
  state: watch::Sender<ConnectionState>,
  ready: Option<oneshot::Sender<Result<(), ConnectError>>>,

  internal_tx: mpsc::UnboundedSender<Internal>,
  internal_rx: mpsc::UnboundedReceiver<Internal>,

  expector: Expector<IrcMessage>,
  user: Queue<Outbound>,
  moderator: Queue<Outbound>,
  whisper: Queue<Outbound>,
  channels: HashMap<String, Channel>,
  next_ping: Instant,
}

impl<S: Socket> Connection<S> {
  pub(crate) fn new(
    config: Config,
    socket: S,
    requests: mpsc::UnboundedReceiver<Request>,
    events: mpsc::UnboundedSender<Event>,
    state: watch::Sender<ConnectionState>,
    ready: oneshot::Sender<Result<(), ConnectError>>,
  ) -> Self {
    let limits = &config.rate_limits;
    let [per_second, per_minute] = limits.whisper();
    let mut user = Queue::new(limits.user());
    let mut moderator = Queue::new(limits.moderator());
    let mut whisper = Queue::new(per_second).with_limiter(per_minute);
    if let Some(size) = limits.queue_size {
      user = user.with_size(size);
      moderator = moderator.with_size(size);
      whisper = whisper.with_size(size);
    }

    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let next_ping = Instant::now() + jitter(config.ping_interval(), config.ping_jitter());

    Self {
      socket,
      config,
      requests,
      events,
      state,
      ready: Some(ready),
      internal_tx,
      internal_rx,
      expector: Expector::new(),
      user,
      moderator,
      whisper,
      channels: HashMap::new(),
      next_ping,
    }
  }

  pub(crate) async fn run(mut self) {
    let result = self.run_in_place().await;
    match &result {
      Ok(()) => debug!("connection closed"),
      Err(e) => warn!("connection lost: {e}"),
    }

    if let Err(e) = self.socket.close().await {
      trace!("failed to close socket: {e}");
    }
    self.state.send_replace(ConnectionState::Disconnected);

    let error = result.err();
    match self.ready.take() {
      Some(ready) => {
        let _ = ready.send(Err(error.map(ConnectError::from).unwrap_or(ConnectError::Closed)));
      }
      None => {
        let _ = self.events.send(Event::Disconnected(error));
      }
    }
  }

  async fn run_in_place(&mut self) -> Result<(), RecvError> {
    self.handshake().await?;
    self.state.send_replace(ConnectionState::Connected);

    loop {
      let now = Instant::now();
      let user_at = self.user.ready_at(now);
      let moderator_at = self.moderator.ready_at(now);
      let whisper_at = self.whisper.ready_at(now);
      let expire_at = self.expector.next_deadline();

      tokio::select! {
        frame = self.socket.next() => match frame {
          Some(frame) => self.on_frame(frame?).await?,
          None => return Err(RecvError::StreamClosed),
        },
        request = self.requests.recv() => match request {
          Some(request) => {
            if self.on_request(request).await.is_break() {
              return Ok(());
            }
          }
          None => {
            debug!("all client handles dropped");
            return Ok(());
          }
        },
        Some(internal) = self.internal_rx.recv() => self.on_internal(internal)?,
        _ = sleep_until(expire_at) => {
          self.expector.expire(Instant::now());
        }
        _ = sleep_until(user_at) => self.flush(Class::User).await,
        _ = sleep_until(moderator_at) => self.flush(Class::Moderator).await,
        _ = sleep_until(whisper_at) => self.flush(Class::Whisper).await,
        _ = tokio::time::sleep_until(self.next_ping) => self.ping().await,
      }
    }
  }

  async fn handshake(&mut self) -> Result<(), RecvError> {
    let credentials = &self.config.credentials;
    if credentials.is_anon() {
      trace!(nick = %credentials.nick, "logging in anonymously");
    } else {
      trace!(nick = %credentials.nick, "logging in with token");
    }

    let lines = [
      write::cap_req(),
      write::pass(&credentials.token()),
      write::nick(&credentials.nick),
      write::user(&credentials.nick),
    ];
    for line in lines {
      self.send(line).await?;
    }
    Ok(())
  }

  async fn send(&mut self, line: String) -> Result<(), tungstenite::Error> {
    if line.starts_with("PASS ") {
      trace!("> PASS ***");
    } else {
      trace!("> {line}");
    }
    self.socket.send(Message::Text(line)).await
  }

  async fn send_logged(&mut self, line: String) {
    if let Err(e) = self.send(line).await {
      warn!("failed to send message: {e}");
    }
  }

  async fn on_frame(&mut self, frame: Message) -> Result<(), RecvError> {
    match frame {
      Message::Text(text) => {
        for message in read::messages(&text) {
          self.on_message(message).await?;
        }
      }
      Message::Close(frame) => {
        debug!(?frame, "received close frame");
        return Err(RecvError::StreamClosed);
      }
      // websocket pings are answered by tungstenite
      _ => {}
    }
    Ok(())
  }

  async fn on_message(&mut self, message: IrcMessage) -> Result<(), RecvError> {
    trace!("< {message:?}");

    let command = message.command();
    match command {
      Command::Ping => {
        let line = write::pong(message.text());
        if let Err(e) = self.send(line).await {
          warn!("failed to send PONG: {e}");
        }
      }
      Command::RplWelcome => self.on_ready(),
      Command::Notice if self.ready.is_some() && is_auth_failure(&message) => {
        let notice = message.text().unwrap_or_default().to_owned();
        return Err(RecvError::Auth(notice));
      }
      Command::Notice => {
        if message.tag("msg-id") == Some("msg_ratelimit") {
          warn!(channel = ?message.channel(), "twitch rejected a message: rate limited");
        }
      }
      Command::UserState => {
        if let Some(name) = message.channel() {
          let moderator = channel::is_moderator(&message);
          let channel = self.channels.entry(name.to_owned()).or_default();
          if channel.moderator != moderator {
            debug!(channel = name, moderator, "moderator status changed");
          }
          channel.moderator = moderator;
        }
      }
      Command::RoomState => {
        if let Some(name) = message.channel() {
          let channel = self.channels.entry(name.to_owned()).or_default();
          if !channel.joined {
            debug!(channel = name, "joined");
          }
          channel.joined = true;
        }
      }
      Command::Reconnect => debug!("twitch requested a reconnect"),
      _ => {}
    }

    let is_ping = command == Command::Ping;
    self.expector.receive(&message);
    if !is_ping {
      let _ = self.events.send(Event::from_message(message));
    }
    Ok(())
  }

  fn on_ready(&mut self) {
    let Some(ready) = self.ready.take() else {
      return;
    };
    debug!(nick = %self.config.credentials.nick, "connected");
    self.state.send_replace(ConnectionState::Ready);
    let _ = ready.send(Ok(()));
    let _ = self.events.send(Event::Ready);
  }

  async fn on_request(&mut self, request: Request) -> ControlFlow<()> {
    match request {
      Request::Join(channels) => {
        let channels = logins(&channels);
        if !channels.is_empty() {
          for name in &channels {
            self.channels.entry(name.clone()).or_default();
          }
          self.send_logged(write::join(&channels)).await;
        }
      }
      Request::Part(channels) => {
        let channels = logins(&channels);
        if !channels.is_empty() {
          for name in &channels {
            self.channels.remove(name);
          }
          self.send_logged(write::part(&channels)).await;
        }
      }
      Request::Chat {
        channel,
        text,
        reply_to,
      } => {
        let channel = channel::login(&channel);
        let moderator = self.channels.get(&channel).is_some_and(|c| c.moderator);
        let queue = if moderator {
          &mut self.moderator
        } else {
          &mut self.user
        };
        let job = Outbound::Chat {
          channel,
          text,
          reply_to,
        };
        if let Err(job) = queue.queue(job) {
          warn!(?job, "queue is full, dropping message");
        }
      }
      Request::Whisper { user, text } => {
        let job = Outbound::Whisper {
          user: channel::login(&user),
          text,
        };
        if let Err(job) = self.whisper.queue(job) {
          warn!(?job, "queue is full, dropping whisper");
        }
      }
      Request::Raw(line) => self.send_logged(line).await,
      Request::SetModerator { channel, moderator } => {
        self
          .channels
          .entry(channel::login(&channel))
          .or_default()
          .moderator = moderator;
      }
      Request::Expect {
        pattern,
        options,
        tx,
        id,
      } => {
        let options = ExpectOptions {
          once: true,
          ..options
        };
        let _ = id.send(self.expector.expect(pattern, options, once_callback(tx)));
      }
      Request::ExpectAll {
        pattern,
        options,
        tx,
        id,
      } => {
        let options = ExpectOptions {
          once: false,
          ..options
        };
        let _ = id.send(self.expector.expect(pattern, options, all_callback(tx)));
      }
      Request::UnExpect(id, done) => {
        self.expector.un_expect(id);
        if let Some(done) = done {
          let _ = done.send(());
        }
      }
      Request::RateLimits(tx) => {
        let _ = tx.send(self.rate_limits());
      }
      Request::Close => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
  }

  fn on_internal(&mut self, internal: Internal) -> Result<(), RecvError> {
    match internal {
      Internal::Pong { sent_at } => {
        let latency = sent_at.elapsed();
        trace!("latency: {}ms", latency.as_millis());
        let _ = self.events.send(Event::Latency(latency));
        Ok(())
      }
      Internal::PongMissing(timeout) => Err(RecvError::KeepaliveTimeout(timeout)),
    }
  }

  /// Send the head of a queue, if it is ready.
  async fn flush(&mut self, class: Class) {
    let now = Instant::now();
    let queue = match class {
      Class::User => &mut self.user,
      Class::Moderator => &mut self.moderator,
      Class::Whisper => &mut self.whisper,
    };
    let Some(job) = queue.pop_ready(now) else {
      return;
    };
    trace!(?class, remaining = queue.len(), "sending queued message");
    self.transmit(job).await;
  }

  async fn transmit(&mut self, job: Outbound) {
    match job {
      Outbound::Chat {
        channel,
        text,
        reply_to,
      } => {
        let text = self
          .channels
          .entry(channel.clone())
          .or_default()
          .smb
          .apply(&text)
          .into_owned();
        let line = write::privmsg(&channel, &text, reply_to.as_deref());
        match self.send(line).await {
          Ok(()) => self.channels.entry(channel).or_default().smb.sent(text),
          Err(e) => warn!(channel = %channel, "failed to send message: {e}"),
        }
      }
      Outbound::Whisper { user, text } => self.send_logged(write::whisper(&user, &text)).await,
    }
  }

  async fn ping(&mut self) {
    let sent_at = Instant::now();
    self.next_ping = sent_at + jitter(self.config.ping_interval(), self.config.ping_jitter());

    let nonce = chrono::Utc::now().timestamp_millis().to_string();
    // :tmi.twitch.tv PONG tmi.twitch.tv :<nonce>
    let pattern = Value::object([
      ("cmd", Value::from("PONG")),
      (
        "params",
        Value::Array(vec![Value::Undefined, Value::from(nonce.as_str())]),
      ),
    ]);
    let timeout = self.config.pong_timeout();
    let options = ExpectOptions::default()
      .timeout(timeout)
      .matching(MatchOptions::default().ignore_undefined(true));
    let internal = self.internal_tx.clone();
    self.expector.expect(pattern, options, move |outcome| {
      let _ = internal.send(match outcome {
        Outcome::Matched(_) => Internal::Pong { sent_at },
        Outcome::Expired => Internal::PongMissing(timeout),
      });
    });

    trace!("send PING {nonce}");
    if let Err(e) = self.send(write::ping(&nonce)).await {
      warn!("failed to send PING: {e}");
    }
  }

  fn rate_limits(&mut self) -> RateLimitStatus {
    let now = Instant::now();
    let budget = |queue: &mut Queue<Outbound>| Budget {
      remaining: queue.remaining_at(now),
      queued: queue.len(),
    };
    RateLimitStatus {
      user: budget(&mut self.user),
      moderator: budget(&mut self.moderator),
      whisper: budget(&mut self.whisper),
    }
  }
}

fn logins(channels: &[String]) -> Vec<String> {
  channels
    .iter()
    .map(|name| channel::login(name))
    .filter(|name| !name.is_empty())
    .collect()
}

fn is_auth_failure(notice: &IrcMessage) -> bool {
  let Some(text) = notice.text() else {
    return false;
  };
  text.contains("authentication failed")
    || text.contains("Improperly formatted auth")
    || text.contains("Login unsuccessful")
}
