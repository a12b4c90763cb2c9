//! Outgoing lines, and the helpers which decide what exactly gets sent.
//!
//! Lines are built without a trailing `\r\n`, because every line is sent in
//! its own WebSocket frame.

use crate::common::JoinIter as _;
use std::borrow::Cow;
use std::fmt::Display;

/// Appended to a message which would otherwise be identical to the previous
/// one, so that Twitch doesn't drop it as a duplicate.
pub const BYPASS_MARKER: &str = " \u{E0000}";

/// Twitch drops chat messages longer than this many characters.
pub const MAX_MESSAGE_LENGTH: usize = 500;

pub const CAPABILITIES: &str = "twitch.tv/tags twitch.tv/commands twitch.tv/membership";

/// Failed to hand a request to the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
  /// The connection task has stopped.
  #[error("failed to send: connection closed")]
  Closed,

  /// Anonymous logins can't chat or whisper.
  #[error("failed to send: anonymous users can't send messages")]
  Anonymous,
}

/// Tracks the last text sent to a channel, and toggles [`BYPASS_MARKER`]
/// when the next one would be a duplicate of it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SameMessageBypass {
  last: Option<String>,
}

impl SameMessageBypass {
  /// The text to transmit in place of `text`.
  ///
  /// This only ever adds or removes the trailing marker.
  pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
    let Some(last) = self.last.as_deref() else {
      return Cow::Borrowed(text);
    };

    let base = strip_marker(text);
    if strip_marker(last) != base {
      return Cow::Borrowed(text);
    }

    if last.ends_with(BYPASS_MARKER) {
      Cow::Borrowed(base)
    } else {
      Cow::Owned(format!("{base}{BYPASS_MARKER}"))
    }
  }

  /// Remember `text` as the last thing handed to the socket.
  pub fn sent(&mut self, text: impl Into<String>) {
    self.last = Some(text.into());
  }

  pub fn last(&self) -> Option<&str> {
    self.last.as_deref()
  }
}

fn strip_marker(text: &str) -> &str {
  text.strip_suffix(BYPASS_MARKER).unwrap_or(text)
}

/// Cut `text` down to at most `max` characters, ending in `…` if anything was cut.
///
/// ```rust
/// use nmb_tmi::client::truncate_message;
///
/// assert_eq!(truncate_message("hello", 10), "hello");
/// assert_eq!(truncate_message("hello world", 6), "hello…");
/// ```
pub fn truncate_message(text: &str, max: usize) -> Cow<'_, str> {
  if text.chars().count() <= max {
    return Cow::Borrowed(text);
  }
  if max == 0 {
    return Cow::Borrowed("");
  }

  let end = text
    .char_indices()
    .nth(max - 1)
    .map(|(i, _)| i)
    .unwrap_or(text.len());
  Cow::Owned(format!("{}…", &text[..end]))
}

/// Line breaks inside a message would start a new command.
fn single_line(text: &str) -> Cow<'_, str> {
  if text.contains(['\r', '\n']) {
    Cow::Owned(text.replace(['\r', '\n'], " "))
  } else {
    Cow::Borrowed(text)
  }
}

pub fn cap_req() -> String {
  format!("CAP REQ :{CAPABILITIES}")
}

pub fn pass(token: &str) -> String {
  format!("PASS {token}")
}

pub fn nick(login: &str) -> String {
  format!("NICK {login}")
}

pub fn user(login: &str) -> String {
  format!("USER {login} 8 * :{login}")
}

pub fn ping(nonce: &str) -> String {
  format!("PING :{nonce}")
}

pub fn pong(arg: Option<&str>) -> String {
  match arg {
    Some(arg) => format!("PONG :{arg}"),
    None => "PONG".into(),
  }
}

pub fn join<I>(channels: I) -> String
where
  I: IntoIterator,
  I::Item: Display,
{
  format!("JOIN {}", channels.into_iter().map(hash).join(","))
}

pub fn part<I>(channels: I) -> String
where
  I: IntoIterator,
  I::Item: Display,
{
  format!("PART {}", channels.into_iter().map(hash).join(","))
}

pub fn privmsg(channel: &str, text: &str, reply_to: Option<&str>) -> String {
  let text = single_line(text);
  match reply_to {
    Some(id) => format!("@reply-parent-msg-id={id} PRIVMSG #{channel} :{text}"),
    None => format!("PRIVMSG #{channel} :{text}"),
  }
}

pub fn whisper(user: &str, text: &str) -> String {
  // `#jtv` is join-less, so whispers can be sent without being in any channel
  format!("PRIVMSG #jtv :/w {user} {}", single_line(text))
}

fn hash(channel: impl Display) -> String {
  format!("#{channel}")
}
