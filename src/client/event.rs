use super::read::RecvError;
use crate::irc::{Command, IrcMessage};
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

/// Something that happened on the connection.
///
/// Every message received from Twitch, except for `PING`, produces exactly one
/// event. Messages which don't have a dedicated variant are delivered as
/// [`Event::Message`].
#[derive(Debug)]
pub enum Event {
  /// The handshake completed.
  Ready,

  /// A user joined a channel.
  Join {
    channel: String,
    user: String,
    message: IrcMessage,
  },

  /// A user left a channel.
  Part {
    channel: String,
    user: String,
    message: IrcMessage,
  },

  /// A chat message.
  Chat {
    channel: String,
    user: String,
    text: String,
    message: IrcMessage,
  },

  /// A whisper sent to us.
  Whisper {
    user: String,
    text: String,
    message: IrcMessage,
  },

  /// A notice. `channel` is `None` for global notices.
  Notice {
    channel: Option<String>,
    text: String,
    message: IrcMessage,
  },

  /// Twitch is about to restart the server, and asks us to reconnect.
  Reconnect(IrcMessage),

  /// Any other message.
  Message(IrcMessage),

  /// Round trip time of a keepalive `PING`.
  Latency(Duration),

  /// The connection is gone. `None` means it was closed by [`Client::close`][super::Client::close].
  Disconnected(Option<RecvError>),
}

impl Event {
  /// Classify an incoming message.
  pub fn from_message(message: IrcMessage) -> Self {
    let channel = message.channel().map(String::from);
    let user = message.nick.clone().or_else(|| message.user.clone());
    let text = message.text().map(String::from);

    match (message.command(), channel, user, text) {
      (Command::Join, Some(channel), Some(user), _) => Event::Join {
        channel,
        user,
        message,
      },
      (Command::Part, Some(channel), Some(user), _) => Event::Part {
        channel,
        user,
        message,
      },
      (Command::Privmsg, Some(channel), Some(user), Some(text)) => Event::Chat {
        channel,
        user,
        text,
        message,
      },
      (Command::Whisper, _, Some(user), Some(text)) => Event::Whisper {
        user,
        text,
        message,
      },
      (Command::Notice, channel, _, Some(text)) => Event::Notice {
        channel,
        text,
        message,
      },
      (Command::Reconnect, ..) => Event::Reconnect(message),
      _ => Event::Message(message),
    }
  }

  /// The message this event was created from, if any.
  pub fn message(&self) -> Option<&IrcMessage> {
    match self {
      Event::Join { message, .. }
      | Event::Part { message, .. }
      | Event::Chat { message, .. }
      | Event::Whisper { message, .. }
      | Event::Notice { message, .. }
      | Event::Reconnect(message)
      | Event::Message(message) => Some(message),
      Event::Ready | Event::Latency(_) | Event::Disconnected(_) => None,
    }
  }

  /// The command of the message this event was created from.
  pub fn cmd(&self) -> Option<&str> {
    self.message().and_then(|message| message.cmd.as_deref())
  }
}

/// The receiving end of a connection's events.
///
/// Events are buffered until they are received, and the buffer is unbounded:
/// keep reading, or drop this if you don't need events. Once dropped,
/// events are discarded. Dropping this does not close the connection.
#[derive(Debug)]
pub struct Events {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl Events {
  pub(super) fn new(rx: mpsc::UnboundedReceiver<Event>) -> Self {
    Self { rx }
  }

  /// Wait for the next event.
  ///
  /// Returns `None` after [`Event::Disconnected`] has been received.
  pub async fn recv(&mut self) -> Option<Event> {
    self.rx.recv().await
  }

  /// Take the next event if one is buffered.
  pub fn try_recv(&mut self) -> Option<Event> {
    self.rx.try_recv().ok()
  }
}

impl Stream for Events {
  type Item = Event;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.rx.poll_recv(cx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn event(line: &str) -> Event {
    Event::from_message(IrcMessage::parse(line).unwrap())
  }

  #[test]
  fn classify() {
    assert!(matches!(
      event(":a!a@a.tmi.twitch.tv JOIN #forsen"),
      Event::Join { channel, user, .. } if channel == "forsen" && user == "a"
    ));
    assert!(matches!(
      event(":a!a@a.tmi.twitch.tv PART #forsen"),
      Event::Part { channel, .. } if channel == "forsen"
    ));
    assert!(matches!(
      event("@id=1 :a!a@a.tmi.twitch.tv PRIVMSG #forsen :hello there"),
      Event::Chat { text, .. } if text == "hello there"
    ));
    assert!(matches!(
      event(":a!a@a.tmi.twitch.tv WHISPER bot :psst"),
      Event::Whisper { user, text, .. } if user == "a" && text == "psst"
    ));
    assert!(matches!(
      event(":tmi.twitch.tv NOTICE * :Login authentication failed"),
      Event::Notice { channel: None, .. }
    ));
    assert!(matches!(event(":tmi.twitch.tv RECONNECT"), Event::Reconnect(_)));
    assert!(matches!(
      event(":tmi.twitch.tv ROOMSTATE #forsen"),
      Event::Message(_)
    ));
  }

  #[test]
  fn cmd_of_event() {
    assert_eq!(event(":tmi.twitch.tv 001 bot :Welcome").cmd(), Some("001"));
    assert_eq!(Event::Ready.cmd(), None);
  }
}
