//! ## Expectation registry
//!
//! An [`Expector`] holds callbacks waiting for a message which structurally
//! matches some pattern. Every incoming candidate is offered to
//! [`Expector::receive`], which runs the callbacks of all matching entries.
//!
//! Entries may carry a timeout. The registry does not own a timer: whoever
//! drives it asks for [`Expector::next_deadline`], sleeps until then, and calls
//! [`Expector::expire`]. Removing an entry removes its deadline with it.

use crate::matcher::{match_keys, MatchOptions, ToValue, Value};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::Instant;

/// Identifies a single registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpectId(u64);

impl ExpectId {
  #[cfg(test)]
  pub(crate) fn from_raw(id: u64) -> Self {
    Self(id)
  }
}

impl Display for ExpectId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Allows [`Expector::un_expect`] to take a single id or many.
impl IntoIterator for ExpectId {
  type Item = ExpectId;
  type IntoIter = std::iter::Once<ExpectId>;

  fn into_iter(self) -> Self::IntoIter {
    std::iter::once(self)
  }
}

/// Options for [`Expector::expect`].
#[derive(Clone, Debug)]
pub struct ExpectOptions {
  /// Remove the entry after its first match.
  pub once: bool,

  /// Expire the entry after this long.
  pub timeout: Option<Duration>,

  /// How the pattern is matched against candidates.
  pub matching: MatchOptions,
}

impl Default for ExpectOptions {
  fn default() -> Self {
    Self {
      once: true,
      timeout: None,
      matching: MatchOptions::default(),
    }
  }
}

impl ExpectOptions {
  /// Fire on every match until removed.
  pub fn persistent() -> Self {
    Self {
      once: false,
      ..Default::default()
    }
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn matching(mut self, matching: MatchOptions) -> Self {
    self.matching = matching;
    self
  }
}

/// What a callback is invoked with.
#[derive(Debug)]
pub enum Outcome<'a, T> {
  /// A candidate matched the pattern.
  Matched(&'a T),
  /// The timeout elapsed before a match.
  Expired,
}

impl<'a, T> Outcome<'a, T> {
  pub fn is_expired(&self) -> bool {
    matches!(self, Outcome::Expired)
  }
}

type Callback<T> = Box<dyn FnMut(Outcome<'_, T>) + Send>;

struct Entry<T> {
  id: ExpectId,
  pattern: Value,
  matching: MatchOptions,
  once: bool,
  deadline: Option<Instant>,
  callback: Callback<T>,
}

/// Registry of pending expectations.
pub struct Expector<T> {
  next_id: u64,
  entries: Vec<Entry<T>>,
}

impl<T> Default for Expector<T> {
  fn default() -> Self {
    Self {
      next_id: 0,
      entries: Vec::new(),
    }
  }
}

impl<T: ToValue> Expector<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `callback` to be called when a candidate matches `pattern`.
  ///
  /// The timeout, if any, is counted from now.
  pub fn expect(
    &mut self,
    pattern: impl Into<Value>,
    options: ExpectOptions,
    callback: impl FnMut(Outcome<'_, T>) + Send + 'static,
  ) -> ExpectId {
    self.expect_at(Instant::now(), pattern, options, callback)
  }

  /// Like [`Expector::expect`], with the timeout counted from `now`.
  pub fn expect_at(
    &mut self,
    now: Instant,
    pattern: impl Into<Value>,
    options: ExpectOptions,
    callback: impl FnMut(Outcome<'_, T>) + Send + 'static,
  ) -> ExpectId {
    self.next_id += 1;
    let id = ExpectId(self.next_id);
    self.entries.push(Entry {
      id,
      pattern: pattern.into(),
      matching: options.matching,
      once: options.once,
      deadline: options.timeout.map(|timeout| now + timeout),
      callback: Box::new(callback),
    });
    trace!(%id, "expectation registered");
    id
  }

  /// Offer `candidate` to every entry, in registration order.
  ///
  /// Returns the number of callbacks which fired.
  pub fn receive(&mut self, candidate: &T) -> usize {
    if self.entries.is_empty() {
      return 0;
    }

    let value = candidate.to_value();
    let mut fired = 0;
    let mut i = 0;
    while i < self.entries.len() {
      let entry = &mut self.entries[i];
      if !match_keys(&entry.pattern, &value, &entry.matching) {
        i += 1;
        continue;
      }

      (entry.callback)(Outcome::Matched(candidate));
      fired += 1;
      if entry.once {
        trace!(id = %entry.id, "expectation fulfilled");
        self.entries.remove(i);
      } else {
        i += 1;
      }
    }
    fired
  }

  /// Remove entries by id. Unknown ids are ignored.
  pub fn un_expect(&mut self, ids: impl IntoIterator<Item = ExpectId>) {
    for id in ids {
      self.entries.retain(|entry| entry.id != id);
    }
  }

  /// Expire every entry whose deadline is at or before `now`.
  ///
  /// Returns the number of expired entries.
  pub fn expire(&mut self, now: Instant) -> usize {
    let mut expired = 0;
    let mut i = 0;
    while i < self.entries.len() {
      if self.entries[i].deadline.is_some_and(|deadline| deadline <= now) {
        let mut entry = self.entries.remove(i);
        trace!(id = %entry.id, "expectation expired");
        (entry.callback)(Outcome::Expired);
        expired += 1;
      } else {
        i += 1;
      }
    }
    expired
  }

  /// The earliest deadline of all entries.
  pub fn next_deadline(&self) -> Option<Instant> {
    self.entries.iter().filter_map(|entry| entry.deadline).min()
  }

  pub fn contains(&self, id: ExpectId) -> bool {
    self.entries.iter().any(|entry| entry.id == id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
