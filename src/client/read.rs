use crate::irc::IrcMessage;
use std::time::Duration;
use tokio_tungstenite::tungstenite;

/// Split a text frame into messages.
///
/// Twitch may batch several lines into one frame. Lines which don't parse
/// are dropped.
pub fn messages(frame: &str) -> impl Iterator<Item = IrcMessage> + '_ {
  frame.lines().filter_map(|line| {
    let message = IrcMessage::parse(line);
    if message.is_none() && !line.is_empty() {
      trace!(?line, "dropped unparseable line");
    }
    message
  })
}

/// The reason a connection stopped receiving messages.
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
  /// The underlying WebSocket failed.
  #[error("failed to read message: {0}")]
  Ws(#[from] tungstenite::Error),

  /// The peer closed the stream.
  #[error("failed to read message: stream closed")]
  StreamClosed,

  /// Twitch did not answer a keepalive `PING` in time.
  #[error("no PONG received within {0:?}")]
  KeepaliveTimeout(Duration),

  /// Twitch rejected the credentials.
  #[error("authentication failed: {0}")]
  Auth(String),
}

impl RecvError {
  /// Returns `true` if the connection ended because of the network or the peer,
  /// rather than because of something the caller has to fix.
  pub fn is_disconnect(&self) -> bool {
    !matches!(self, RecvError::Auth(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_with_several_lines() {
    let frame = ":tmi.twitch.tv 001 justinfan12345 :Welcome, GLHF!\r\n:tmi.twitch.tv 002 justinfan12345 :Your host is tmi.twitch.tv\r\n";
    let cmds = messages(frame)
      .map(|message| message.cmd.unwrap_or_default())
      .collect::<Vec<_>>();
    assert_eq!(cmds, vec!["001", "002"]);
  }

  #[test]
  fn blank_lines_are_skipped() {
    assert_eq!(messages("\r\n  \r\nPING :tmi.twitch.tv\n").count(), 1);
    assert_eq!(messages("").count(), 0);
  }
}
