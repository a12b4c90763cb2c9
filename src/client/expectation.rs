//! Awaitable handles over [`Expector`][crate::expect::Expector] registrations
//! held by the connection.

use super::actor::Request;
use crate::expect::{ExpectId, Outcome};
use crate::irc::IrcMessage;
use futures_util::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// Why an [`Expectation`] resolved without a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExpectError {
  /// The timeout elapsed first.
  #[error("expectation timed out")]
  Timeout,

  /// The connection closed first.
  #[error("connection closed")]
  Closed,
}

pub(super) type OnceSender = oneshot::Sender<Result<IrcMessage, ExpectError>>;

pub(super) fn once_callback(tx: OnceSender) -> impl FnMut(Outcome<'_, IrcMessage>) + Send + 'static {
  let mut tx = Some(tx);
  move |outcome| {
    let Some(tx) = tx.take() else {
      return;
    };
    let _ = tx.send(match outcome {
      Outcome::Matched(message) => Ok(message.clone()),
      Outcome::Expired => Err(ExpectError::Timeout),
    });
  }
}

pub(super) fn all_callback(
  tx: mpsc::UnboundedSender<IrcMessage>,
) -> impl FnMut(Outcome<'_, IrcMessage>) + Send + 'static {
  let mut tx = Some(tx);
  move |outcome| match outcome {
    Outcome::Matched(message) => {
      if let Some(tx) = &tx {
        let _ = tx.send(message.clone());
      }
    }
    // ends the stream
    Outcome::Expired => drop(tx.take()),
  }
}

/// A pending one-shot expectation.
///
/// Resolves to the first message which matched, or to [`ExpectError::Timeout`].
/// Dropping it before it resolves removes the registration.
#[derive(Debug)]
#[must_use = "an expectation is removed when dropped"]
pub struct Expectation {
  id: ExpectId,
  rx: oneshot::Receiver<Result<IrcMessage, ExpectError>>,
  requests: mpsc::UnboundedSender<Request>,
  done: bool,
}

impl Expectation {
  pub(super) fn new(
    id: ExpectId,
    rx: oneshot::Receiver<Result<IrcMessage, ExpectError>>,
    requests: mpsc::UnboundedSender<Request>,
  ) -> Self {
    Self {
      id,
      rx,
      requests,
      done: false,
    }
  }

  pub fn id(&self) -> ExpectId {
    self.id
  }

  /// Remove the registration.
  pub fn cancel(self) {}
}

impl Future for Expectation {
  type Output = Result<IrcMessage, ExpectError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    let result = ready!(Pin::new(&mut this.rx).poll(cx));
    this.done = true;
    Poll::Ready(result.unwrap_or(Err(ExpectError::Closed)))
  }
}

impl Drop for Expectation {
  fn drop(&mut self) {
    if !self.done {
      let _ = self.requests.send(Request::UnExpect(self.id, None));
    }
  }
}

/// A persistent expectation, yielding every message which matches.
///
/// Ends when its timeout elapses or the connection closes.
/// Dropping it removes the registration.
#[derive(Debug)]
#[must_use = "an expectation is removed when dropped"]
pub struct Expectations {
  id: ExpectId,
  rx: mpsc::UnboundedReceiver<IrcMessage>,
  requests: mpsc::UnboundedSender<Request>,
}

impl Expectations {
  pub(super) fn new(
    id: ExpectId,
    rx: mpsc::UnboundedReceiver<IrcMessage>,
    requests: mpsc::UnboundedSender<Request>,
  ) -> Self {
    Self { id, rx, requests }
  }

  pub fn id(&self) -> ExpectId {
    self.id
  }

  /// Wait for the next match.
  pub async fn recv(&mut self) -> Option<IrcMessage> {
    self.rx.recv().await
  }

  /// Remove the registration.
  pub fn cancel(self) {}
}

impl Stream for Expectations {
  type Item = IrcMessage;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.rx.poll_recv(cx)
  }
}

impl Drop for Expectations {
  fn drop(&mut self) {
    let _ = self.requests.send(Request::UnExpect(self.id, None));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pong() -> IrcMessage {
    IrcMessage::parse(":tmi.twitch.tv PONG tmi.twitch.tv :123").unwrap()
  }

  #[test]
  fn once_callback_sends_a_single_result() {
    let (tx, mut rx) = oneshot::channel();
    let mut callback = once_callback(tx);
    callback(Outcome::Matched(&pong()));
    callback(Outcome::Expired);
    assert_eq!(rx.try_recv(), Ok(Ok(pong())));
  }

  #[test]
  fn once_callback_reports_timeout() {
    let (tx, mut rx) = oneshot::channel();
    once_callback(tx)(Outcome::Expired);
    assert_eq!(rx.try_recv(), Ok(Err(ExpectError::Timeout)));
  }

  #[test]
  fn all_callback_closes_on_expiry() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut callback = all_callback(tx);
    callback(Outcome::Matched(&pong()));
    callback(Outcome::Matched(&pong()));
    callback(Outcome::Expired);
    callback(Outcome::Matched(&pong()));

    assert_eq!(rx.try_recv(), Ok(pong()));
    assert_eq!(rx.try_recv(), Ok(pong()));
    assert_eq!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected));
  }

  #[tokio::test]
  async fn dropping_an_expectation_unregisters_it() {
    let (requests, mut rx) = mpsc::unbounded_channel();
    let (_tx, once) = oneshot::channel();
    let (_all_tx, all) = mpsc::unbounded_channel();

    let a = Expectation::new(ExpectId::from_raw(1), once, requests.clone());
    let b = Expectations::new(ExpectId::from_raw(2), all, requests);
    a.cancel();
    drop(b);

    assert!(matches!(rx.recv().await, Some(Request::UnExpect(id, None)) if id == ExpectId::from_raw(1)));
    assert!(matches!(rx.recv().await, Some(Request::UnExpect(id, None)) if id == ExpectId::from_raw(2)));
  }

  #[tokio::test]
  async fn closed_connection_resolves_expectation() {
    let (requests, _rx) = mpsc::unbounded_channel();
    let (tx, once) = oneshot::channel::<Result<IrcMessage, ExpectError>>();
    let expectation = Expectation::new(ExpectId::from_raw(1), once, requests);
    drop(tx);
    assert_eq!(expectation.await, Err(ExpectError::Closed));
  }
}
