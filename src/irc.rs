//! ## IRCv3 Message parser
//!
//! The entrypoint to this module is [`parse`], or its alias [`IrcMessage::parse`].
//!
//! ```rust
//! let msg = nmb_tmi::irc::parse("@mod=1 :nick!user@host PRIVMSG #forsen :hello there").unwrap();
//! assert_eq!(msg.cmd.as_deref(), Some("PRIVMSG"));
//! assert_eq!(msg.text(), Some("hello there"));
//! ```
//!
//! The parser never fails loudly. Anything that is not empty produces a message,
//! and fields which could not be found are left as `None` or empty.

mod command;
mod params;
mod prefix;
mod tags;

pub use command::Command;
pub use tags::{unescape, TagValue};

use crate::matcher::{ToValue, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// A parsed IRC line.
///
/// This owns all of its parts, so it can be freely moved between the
/// connection task and whoever is waiting for it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IrcMessage {
  /// IRCv3 tags. Bare tags and tags with an empty value are [`TagValue::Flag`].
  pub tags: BTreeMap<String, TagValue>,

  /// The raw prefix, without the leading `:`.
  pub prefix: Option<String>,

  /// The `nick` part of `nick!user@host`.
  pub nick: Option<String>,

  /// The `user` part of `nick!user@host`.
  pub user: Option<String>,

  /// The `host` part of `nick!user@host`, or the whole prefix if it is a server name.
  pub host: Option<String>,

  /// The command or numeric reply.
  pub cmd: Option<String>,

  /// Positional params. The last one may contain spaces.
  pub params: Vec<String>,
}

/// Parse a single IRC line.
///
/// Returns `None` for empty or whitespace-only input.
pub fn parse(raw: &str) -> Option<IrcMessage> {
  let src = raw.trim_start().trim_end_matches(['\r', '\n']);
  if src.is_empty() {
    return None;
  }

  let mut pos = 0usize;

  let tags = tags::parse(src, &mut pos).unwrap_or_default();
  skip_spaces(src, &mut pos);
  let prefix = prefix::parse(src, &mut pos);
  skip_spaces(src, &mut pos);
  let cmd = command::parse(src, &mut pos);
  let params = params::parse(src, &mut pos);

  let (nick, user, host) = match &prefix {
    Some(prefix) => {
      let parts = prefix::split(prefix);
      (
        parts.nick.map(String::from),
        parts.user.map(String::from),
        parts.host.map(String::from),
      )
    }
    None => (None, None, None),
  };

  Some(IrcMessage {
    tags,
    prefix,
    nick,
    user,
    host,
    cmd: cmd.map(String::from),
    params,
  })
}

#[inline]
fn skip_spaces(src: &str, pos: &mut usize) {
  while src.as_bytes().get(*pos) == Some(&b' ') {
    *pos += 1;
  }
}

impl IrcMessage {
  /// Parse a single IRC line. See [`parse`].
  pub fn parse(raw: &str) -> Option<Self> {
    parse(raw)
  }

  /// Get the typed [`Command`].
  ///
  /// Messages without a command are reported as `Command::Other("")`.
  pub fn command(&self) -> Command<'_> {
    Command::parse(self.cmd.as_deref().unwrap_or(""))
  }

  /// Retrieve the textual value of `key`.
  ///
  /// Flags have no textual value, use [`IrcMessage::has_tag`] for those.
  pub fn tag(&self, key: &str) -> Option<&str> {
    match self.tags.get(key) {
      Some(TagValue::Text(value)) => Some(value),
      _ => None,
    }
  }

  /// Returns `true` if `key` is present, either as a flag or with a value.
  pub fn has_tag(&self, key: &str) -> bool {
    self.tags.contains_key(key)
  }

  /// The channel name this message was sent to, without the leading `#`.
  pub fn channel(&self) -> Option<&str> {
    self
      .params
      .iter()
      .find_map(|param| param.strip_prefix('#'))
  }

  /// The last param, which is usually the message text.
  pub fn text(&self) -> Option<&str> {
    self.params.last().map(|v| v.as_str())
  }

  /// The matcher view of this message, used by the expectation registry.
  pub fn to_value(&self) -> Value {
    Value::from_serialize(self)
  }
}

impl ToValue for IrcMessage {
  fn to_value(&self) -> Value {
    IrcMessage::to_value(self)
  }
}

impl std::str::FromStr for IrcMessage {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse(s).ok_or(ParseError)
  }
}

/// The input was empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse message: empty input")]
pub struct ParseError;

#[cfg(test)]
mod tests {
  use super::*;

  fn text(value: &str) -> TagValue {
    TagValue::Text(value.into())
  }

  #[test]
  fn empty_input_is_none() {
    assert_eq!(parse(""), None);
    assert_eq!(parse("   "), None);
    assert_eq!(parse("\t \r\n"), None);
  }

  #[test]
  fn tags_prefix_command_and_trailing() {
    let msg = parse("@key=value :prefix CMD p1 p2 :trailing with: spaces  and :colons").unwrap();
    assert_eq!(msg.tags.get("key"), Some(&text("value")));
    assert_eq!(msg.prefix.as_deref(), Some("prefix"));
    assert_eq!(msg.cmd.as_deref(), Some("CMD"));
    assert_eq!(
      msg.params,
      vec!["p1", "p2", "trailing with: spaces  and :colons"]
    );
  }

  #[test]
  fn escaped_tag_value() {
    let msg = parse(r"@d=\\\s\r\n\:").unwrap();
    assert_eq!(msg.tags.get("d"), Some(&text("\\ \r\n;")));
    assert_eq!(msg.cmd, None);
    assert!(msg.params.is_empty());
  }

  #[test]
  fn tags_without_value_are_flags() {
    let msg = parse("@a;b=;c=1;emotes= PING").unwrap();
    assert_eq!(msg.tags.get("a"), Some(&TagValue::Flag));
    assert_eq!(msg.tags.get("b"), Some(&TagValue::Flag));
    assert_eq!(msg.tags.get("c"), Some(&text("1")));
    assert_eq!(msg.tags.get("emotes"), Some(&TagValue::Flag));
    assert_eq!(msg.command(), Command::Ping);
  }

  #[test]
  fn no_tags_still_has_empty_map() {
    let msg = parse("PING :tmi.twitch.tv").unwrap();
    assert!(msg.tags.is_empty());
    assert_eq!(msg.prefix, None);
    assert_eq!(msg.params, vec!["tmi.twitch.tv"]);
  }

  #[test]
  fn notice_without_channel() {
    let msg = parse(":tmi.twitch.tv NOTICE * :Improperly formatted auth").unwrap();
    assert_eq!(msg.command(), Command::Notice);
    assert_eq!(msg.host.as_deref(), Some("tmi.twitch.tv"));
    assert_eq!(msg.nick, None);
    assert_eq!(msg.user, None);
    assert_eq!(msg.channel(), None);
    assert_eq!(msg.text(), Some("Improperly formatted auth"));
  }

  #[test]
  fn full_prefix() {
    let msg =
      parse(":justinfan57624!justinfan57624@justinfan57624.tmi.twitch.tv JOIN #riotgames").unwrap();
    assert_eq!(msg.nick.as_deref(), Some("justinfan57624"));
    assert_eq!(msg.user.as_deref(), Some("justinfan57624"));
    assert_eq!(msg.host.as_deref(), Some("justinfan57624.tmi.twitch.tv"));
    assert_eq!(msg.command(), Command::Join);
    assert_eq!(msg.channel(), Some("riotgames"));
  }

  #[test]
  fn equals_in_tag_value() {
    let data = "@display-name=Dixtor334;reply-parent-msg-body=https://youtu.be/-ek4MFjz_eM?list=PL91C6439FD45DE2F3\\sannytfDinkDonk;room-id=56418014 :dixtor334!dixtor334@dixtor334.tmi.twitch.tv PRIVMSG #anny :@minosura @anny";
    let msg = parse(data).unwrap();
    assert_eq!(
      msg.tag("reply-parent-msg-body"),
      Some("https://youtu.be/-ek4MFjz_eM?list=PL91C6439FD45DE2F3 annytfDinkDonk")
    );
    assert_eq!(msg.tag("display-name"), Some("Dixtor334"));
    assert_eq!(msg.text(), Some("@minosura @anny"));
  }

  #[test]
  fn leading_whitespace_and_line_terminator() {
    let msg = parse("  PRIVMSG #pajlada :hi \r\n").unwrap();
    assert_eq!(msg.params, vec!["#pajlada", "hi "]);
  }

  #[test]
  fn multibyte_trailing_is_preserved() {
    let msg = parse("@display-name=테스트계정420 :a!a@a PRIVMSG #pajlada :테스트 : 계정 ⠀").unwrap();
    assert_eq!(msg.tag("display-name"), Some("테스트계정420"));
    assert_eq!(msg.text(), Some("테스트 : 계정 ⠀"));
  }

  #[test]
  fn tags_only_is_tolerated() {
    let msg = parse("@a=b").unwrap();
    assert_eq!(msg.tag("a"), Some("b"));
    assert_eq!(msg.cmd, None);
    assert_eq!(msg.command(), Command::Other(""));
  }

  #[test]
  fn prefix_only_is_tolerated() {
    let msg = parse(":nick!user@host").unwrap();
    assert_eq!(msg.nick.as_deref(), Some("nick"));
    assert_eq!(msg.cmd, None);
  }

  #[test]
  fn from_str() {
    assert!("".parse::<IrcMessage>().is_err());
    let msg: IrcMessage = "RECONNECT".parse().unwrap();
    assert_eq!(msg.command(), Command::Reconnect);
  }

  #[test]
  fn snapshot_privmsg() {
    let msg = parse("@badge-info=;badges=moderator/1;color=#0000FF;display-name=JuN1oRRRR;mod=1;room-id=11148817;user-type=mod :jun1orrrr!jun1orrrr@jun1orrrr.tmi.twitch.tv PRIVMSG #pajlada :dank cam").unwrap();
    insta::assert_json_snapshot!(msg, @r###"
    {
      "tags": {
        "badge-info": true,
        "badges": "moderator/1",
        "color": "#0000FF",
        "display-name": "JuN1oRRRR",
        "mod": "1",
        "room-id": "11148817",
        "user-type": "mod"
      },
      "prefix": "jun1orrrr!jun1orrrr@jun1orrrr.tmi.twitch.tv",
      "nick": "jun1orrrr",
      "user": "jun1orrrr",
      "host": "jun1orrrr.tmi.twitch.tv",
      "cmd": "PRIVMSG",
      "params": [
        "#pajlada",
        "dank cam"
      ]
    }
    "###);
  }
}
