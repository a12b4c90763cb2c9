use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// The value of a single tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TagValue {
  /// `key` or `key=`, serialized as `true`.
  Flag,
  /// `key=value`, already unescaped.
  Text(String),
}

impl TagValue {
  /// Get the textual value, if any.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      TagValue::Flag => None,
      TagValue::Text(value) => Some(value),
    }
  }
}

impl Serialize for TagValue {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      TagValue::Flag => serializer.serialize_bool(true),
      TagValue::Text(value) => serializer.serialize_str(value),
    }
  }
}

/// `@key=value;key;key= <rest>`
///
/// Leaves `pos` on the space which terminates the tag block.
pub(super) fn parse(src: &str, pos: &mut usize) -> Option<BTreeMap<String, TagValue>> {
  if !src[*pos..].starts_with('@') {
    return None;
  }

  let start = *pos + 1;
  let end = match src[start..].find(' ') {
    Some(end) => start + end,
    None => src.len(),
  };

  let mut tags = BTreeMap::new();
  for pair in src[start..end].split(';') {
    let (key, value) = match pair.split_once('=') {
      Some((key, "")) => (key, TagValue::Flag),
      Some((key, value)) => match unescape(value) {
        value if value.is_empty() => (key, TagValue::Flag),
        value => (key, TagValue::Text(value)),
      },
      None => (pair, TagValue::Flag),
    };
    if key.is_empty() {
      continue;
    }
    tags.insert(key.to_owned(), value);
  }

  *pos = end;

  Some(tags)
}

/// Unescape a tag `value`.
///
/// `\s` is a space, `\:` is a `;`, `\\` is a `\`, `\r` and `\n` are CR and LF.
/// Any other escaped character stands for itself, and a trailing `\` is dropped.
pub fn unescape(value: &str) -> String {
  if !value.contains('\\') {
    return value.to_owned();
  }

  let mut out = String::with_capacity(value.len());
  let mut escape = false;
  for char in value.chars() {
    match char {
      _ if escape => {
        out.push(match char {
          's' => ' ',
          ':' => ';',
          'r' => '\r',
          'n' => '\n',
          c => c,
        });
        escape = false;
      }
      '\\' => escape = true,
      c => out.push(c),
    }
  }
  out
}
