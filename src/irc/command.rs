use std::fmt::Display;

/// `COMMAND <rest>`
///
/// Returns `None` if there is no command token.
pub(super) fn parse<'src>(src: &'src str, pos: &mut usize) -> Option<&'src str> {
  let rest = &src[*pos..];
  let end = rest.find(' ').unwrap_or(rest.len());
  *pos += end;

  match &rest[..end] {
    "" => None,
    cmd => Some(cmd),
  }
}

/// A Twitch IRC command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command<'src> {
  /// Ping the peer
  Ping,
  /// The peer's response to a [`Command::Ping`]
  Pong,
  /// Join a channel
  Join,
  /// Leave a channel
  Part,
  /// Send a message to a channel
  Privmsg,
  /// Send a private message to a user
  Whisper,
  /// Purge a user's messages in a channel
  ClearChat,
  /// Remove a single message
  ClearMsg,
  /// Sent upon successful authentication (PASS/NICK command)
  GlobalUserState,
  /// General notices from the server
  Notice,
  /// Rejoins channels after a restart
  Reconnect,
  /// Identifies the channel's chat settings
  RoomState,
  /// Announces Twitch-specific events to the channel
  UserNotice,
  /// Identifies a user's chat settings or properties
  UserState,
  /// Requesting an IRC capability
  Capability,
  // Numeric commands
  /// `001`
  RplWelcome,
  /// `002`
  RplYourHost,
  /// `003`
  RplCreated,
  /// `004`
  RplMyInfo,
  /// `353`
  RplNames,
  /// `366`
  RplEndOfNames,
  /// `372`
  RplMotd,
  /// `375`
  RplMotdStart,
  /// `376`
  RplEndOfMotd,
  /// Unknown command
  Other(&'src str),
}

impl<'src> Display for Command<'src> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl<'src> Command<'src> {
  /// Parse a command token.
  pub fn parse(cmd: &'src str) -> Self {
    use Command::*;
    match cmd {
      "PING" => Ping,
      "PONG" => Pong,
      "JOIN" => Join,
      "PART" => Part,
      "PRIVMSG" => Privmsg,
      "WHISPER" => Whisper,
      "CLEARCHAT" => ClearChat,
      "CLEARMSG" => ClearMsg,
      "GLOBALUSERSTATE" => GlobalUserState,
      "NOTICE" => Notice,
      "RECONNECT" => Reconnect,
      "ROOMSTATE" => RoomState,
      "USERNOTICE" => UserNotice,
      "USERSTATE" => UserState,
      "CAP" => Capability,
      "001" => RplWelcome,
      "002" => RplYourHost,
      "003" => RplCreated,
      "004" => RplMyInfo,
      "353" => RplNames,
      "366" => RplEndOfNames,
      "372" => RplMotd,
      "375" => RplMotdStart,
      "376" => RplEndOfMotd,
      other => Other(other),
    }
  }

  /// Get the string value of the [`Command`].
  pub fn as_str(&self) -> &'src str {
    use Command::*;
    match self {
      Ping => "PING",
      Pong => "PONG",
      Join => "JOIN",
      Part => "PART",
      Privmsg => "PRIVMSG",
      Whisper => "WHISPER",
      ClearChat => "CLEARCHAT",
      ClearMsg => "CLEARMSG",
      GlobalUserState => "GLOBALUSERSTATE",
      Notice => "NOTICE",
      Reconnect => "RECONNECT",
      RoomState => "ROOMSTATE",
      UserNotice => "USERNOTICE",
      UserState => "USERSTATE",
      Capability => "CAP",
      RplWelcome => "001",
      RplYourHost => "002",
      RplCreated => "003",
      RplMyInfo => "004",
      RplNames => "353",
      RplEndOfNames => "366",
      RplMotd => "372",
      RplMotdStart => "375",
      RplEndOfMotd => "376",
      Other(cmd) => cmd,
    }
  }
}
