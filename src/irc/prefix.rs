/// The parts of a message prefix.
///
/// ```text,ignore
/// :nick!user@host
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) struct Parts<'src> {
  pub(super) nick: Option<&'src str>,
  pub(super) user: Option<&'src str>,
  pub(super) host: Option<&'src str>,
}

/// `:prefix <rest>`
///
/// Leaves `pos` on the space which terminates the prefix.
pub(super) fn parse(src: &str, pos: &mut usize) -> Option<String> {
  if !src[*pos..].starts_with(':') {
    return None;
  }

  let start = *pos + 1;
  let end = match src[start..].find(' ') {
    Some(end) => start + end,
    None => src.len(),
  };
  *pos = end;

  Some(src[start..end].to_owned())
}

/// Split a prefix into its parts.
///
/// `nick` is only present if there is a `!`. `user` spans from after the `!`
/// (or the start) up to the first `@`, so `nick@host` has a `user` but no `nick`.
pub(super) fn split(prefix: &str) -> Parts<'_> {
  let bang = prefix.find('!');
  let nick = bang.map(|i| &prefix[..i]);
  let user_start = bang.map_or(0, |i| i + 1);
  let at = prefix[user_start..].find('@').map(|i| user_start + i);
  let user = at.map(|at| &prefix[user_start..at]);
  let host = match (bang, at) {
    (_, Some(at)) => Some(&prefix[at + 1..]),
    (None, None) => Some(prefix),
    (Some(_), None) => None,
  };

  Parts {
    nick,
    user,
    host: host.filter(|v| !v.is_empty()),
  }
}
