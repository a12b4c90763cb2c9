use super::write::SameMessageBypass;
use crate::irc::IrcMessage;

/// Per-channel state held by the connection.
///
/// It is created fresh for every connection.
#[derive(Clone, Debug, Default)]
pub(super) struct Channel {
  /// Whether we have seen a `ROOMSTATE` for this channel.
  pub joined: bool,

  /// Whether our account may use the moderator rate limits here.
  pub moderator: bool,

  pub smb: SameMessageBypass,
}

/// The login of a channel: no `#`, lowercase.
pub fn login(channel: &str) -> String {
  channel.trim().trim_start_matches('#').to_ascii_lowercase()
}

/// Whether a `USERSTATE` says that we are a moderator (or the broadcaster).
pub(super) fn is_moderator(userstate: &IrcMessage) -> bool {
  if userstate.tag("mod") == Some("1") {
    return true;
  }
  userstate.tag("badges").is_some_and(|badges| {
    badges
      .split(',')
      .filter_map(|badge| badge.split_once('/'))
      .any(|(name, _)| name == "broadcaster" || name == "moderator")
  })
}
