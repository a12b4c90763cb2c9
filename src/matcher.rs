//! ## Structural key matching
//!
//! [`match_keys`] tests whether a candidate contains every key of a pattern,
//! optionally comparing the values as well. It works on [`Value`], a small
//! dynamic tree which is JSON plus an explicit [`Value::Undefined`], so that
//! a pattern can say "this key must exist, I don't care about its value".
//!
//! ```rust
//! use nmb_tmi::matcher::{match_keys, MatchOptions, Value};
//! use serde_json::json;
//!
//! let pattern = Value::from(json!({ "cmd": "PONG" }));
//! let candidate = Value::from(json!({ "cmd": "PONG", "params": ["tmi.twitch.tv"] }));
//! assert!(match_keys(&pattern, &candidate, &MatchOptions::default()));
//! ```

use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A dynamically typed value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
  /// A key which exists but has no value.
  #[default]
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  String(String),
  Array(Vec<Value>),
  Object(BTreeMap<String, Value>),
}

impl Value {
  /// Build an object from key-value pairs.
  pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
  where
    K: Into<String>,
    V: Into<Value>,
  {
    Value::Object(
      entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }

  /// Convert anything serializable.
  ///
  /// Values which can't be represented (e.g. maps with non-string keys)
  /// become [`Value::Undefined`].
  pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
    match serde_json::to_value(value) {
      Ok(value) => value.into(),
      Err(e) => {
        trace!("value is not representable: {e}");
        Value::Undefined
      }
    }
  }

  /// Look up a key. Arrays are indexed by the decimal representation of the index.
  pub fn get(&self, key: &str) -> Option<&Value> {
    match self {
      Value::Object(map) => map.get(key),
      Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    }
  }

  fn is_container(&self) -> bool {
    matches!(self, Value::Array(_) | Value::Object(_))
  }

  fn keys(&self) -> Vec<(Cow<'_, str>, &Value)> {
    match self {
      Value::Object(map) => map.iter().map(|(k, v)| (Cow::from(k.as_str()), v)).collect(),
      Value::Array(items) => items
        .iter()
        .enumerate()
        .map(|(i, v)| (Cow::from(i.to_string()), v))
        .collect(),
      _ => Vec::new(),
    }
  }
}

impl From<serde_json::Value> for Value {
  fn from(value: serde_json::Value) -> Self {
    use serde_json::Value as J;
    match value {
      J::Null => Value::Null,
      J::Bool(v) => Value::Bool(v),
      J::Number(v) => Value::Number(v.as_f64().unwrap_or(f64::NAN)),
      J::String(v) => Value::String(v),
      J::Array(v) => Value::Array(v.into_iter().map(Value::from).collect()),
      J::Object(v) => Value::Object(v.into_iter().map(|(k, v)| (k, v.into())).collect()),
    }
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_owned())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Number(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Number(value as f64)
  }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
  fn from(value: Vec<T>) -> Self {
    Value::Array(value.into_iter().map(Into::into).collect())
  }
}

/// Types which have a matcher view.
pub trait ToValue {
  fn to_value(&self) -> Value;
}

impl ToValue for Value {
  fn to_value(&self) -> Value {
    self.clone()
  }
}

impl ToValue for serde_json::Value {
  fn to_value(&self) -> Value {
    self.clone().into()
  }
}

/// Options for [`match_keys`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchOptions {
  /// Compare values, not just key presence.
  pub match_values: bool,

  /// Treat [`Value::Undefined`] in the pattern as "any value".
  pub ignore_undefined: bool,

  /// Stop descending after this many levels. Anything deeper matches.
  pub max_depth: Option<usize>,
}

impl Default for MatchOptions {
  fn default() -> Self {
    Self {
      match_values: true,
      ignore_undefined: false,
      max_depth: None,
    }
  }
}

impl MatchOptions {
  /// Only check that keys exist.
  pub fn keys_only() -> Self {
    Self {
      match_values: false,
      ..Default::default()
    }
  }

  pub fn ignore_undefined(mut self, value: bool) -> Self {
    self.ignore_undefined = value;
    self
  }

  pub fn max_depth(mut self, depth: usize) -> Self {
    self.max_depth = Some(depth);
    self
  }
}

/// Returns `true` if every key in `pattern` is present in `candidate`.
///
/// With [`MatchOptions::match_values`], primitive values must also be equal, and
/// nested containers are matched recursively.
///
/// Two behaviors are kept for compatibility with existing patterns:
/// - `Null` on either side matches any value.
/// - Past [`MatchOptions::max_depth`] everything matches, including missing keys.
pub fn match_keys(pattern: &Value, candidate: &Value, options: &MatchOptions) -> bool {
  match_at(pattern, candidate, options, 1)
}

fn match_at(pattern: &Value, candidate: &Value, options: &MatchOptions, depth: usize) -> bool {
  if options.max_depth.is_some_and(|max| depth > max) {
    return true;
  }

  for (key, expected) in pattern.keys() {
    let Some(actual) = candidate.get(&key) else {
      return false;
    };

    if !options.match_values {
      continue;
    }
    if options.ignore_undefined && *expected == Value::Undefined {
      continue;
    }
    if *expected == Value::Null || *actual == Value::Null {
      continue;
    }

    let ok = if expected.is_container() && actual.is_container() {
      match_at(expected, actual, options, depth + 1)
    } else {
      strict_eq(expected, actual)
    };
    if !ok {
      return false;
    }
  }

  true
}

fn strict_eq(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Undefined, Value::Undefined) => true,
    (Value::Bool(a), Value::Bool(b)) => a == b,
    (Value::Number(a), Value::Number(b)) => a == b,
    (Value::String(a), Value::String(b)) => a == b,
    _ => false,
  }
}
