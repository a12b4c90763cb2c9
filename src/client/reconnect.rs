use super::util::jitter;
use super::{Client, Config, ConnectError, Events};
use std::future::Future;
use std::time::Duration;

/// Decides how long to wait between connection attempts.
pub trait ReconnectPolicy {
  /// The delay before retry number `attempt`, counting from 1.
  ///
  /// Returns `None` to give up.
  fn next_delay(&mut self, attempt: u32) -> Option<Duration>;
}

impl<F> ReconnectPolicy for F
where
  F: FnMut(u32) -> Option<Duration>,
{
  fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
    self(attempt)
  }
}

/// Exponential backoff with jitter.
#[derive(Clone, Debug)]
pub struct Backoff {
  /// The maximum number of reconnect attempts to make.
  pub max_tries: Option<u32>,

  /// Before attempting the first reconnect, the client will wait this long.
  pub initial_delay: Duration,

  /// After each failed reconnect attempt, the delay will be multiplied by this value.
  pub delay_multiplier: u32,

  /// The maximum delay to wait inbetween connection attempts.
  pub max_delay: Duration,

  /// Each delay is moved by a random amount of up to this much in either direction.
  pub jitter: Duration,
}

/// The default reconnect backoff.
pub const DEFAULT_BACKOFF: Backoff = Backoff {
  max_tries: Some(8),
  initial_delay: Duration::from_secs(1),
  delay_multiplier: 3,
  max_delay: Duration::from_secs(12),
  jitter: Duration::from_millis(500),
};

impl Default for Backoff {
  fn default() -> Self {
    DEFAULT_BACKOFF
  }
}

impl Backoff {
  /// The delay before retry number `attempt`, without jitter.
  pub fn base_delay(&self, attempt: u32) -> Duration {
    let factor = self
      .delay_multiplier
      .saturating_pow(attempt.saturating_sub(1));
    self
      .initial_delay
      .saturating_mul(factor)
      .min(self.max_delay)
  }
}

impl ReconnectPolicy for Backoff {
  fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
    if self.max_tries.is_some_and(|max| attempt > max) {
      return None;
    }
    Some(jitter(self.base_delay(attempt), self.jitter))
  }
}

/// An error which occurred while attempting to reconnect to Twitch IRC.
#[derive(Debug, thiserror::Error)]
#[error("all {attempts} connection attempts failed. last error was: {cause}")]
pub struct ReconnectError {
  pub attempts: u32,

  /// The last encountered error.
  #[source]
  pub cause: ConnectError,
}

/// [`Client::connect`], retried according to `policy`.
///
/// Errors which can't be fixed by trying again, like invalid credentials,
/// are returned immediately.
pub async fn connect_with_retry(
  config: Config,
  policy: &mut impl ReconnectPolicy,
) -> Result<(Client, Events), ReconnectError> {
  retry(policy, || Client::connect(config.clone())).await
}

async fn retry<T, F, Fut>(
  policy: &mut impl ReconnectPolicy,
  mut connect: F,
) -> Result<T, ReconnectError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, ConnectError>>,
{
  let mut attempts = 0;
  loop {
    attempts += 1;
    let cause = match connect().await {
      Ok(value) => return Ok(value),
      Err(cause) if !cause.should_retry() => return Err(ReconnectError { attempts, cause }),
      Err(cause) => cause,
    };

    let Some(delay) = policy.next_delay(attempts) else {
      return Err(ReconnectError { attempts, cause });
    };
    debug!(attempts, ?delay, "{cause}, retrying");
    tokio::time::sleep(delay).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::time::Instant;

  #[test]
  fn backoff_grows_until_max() {
    let backoff = DEFAULT_BACKOFF;
    let delays = (1..=5)
      .map(|attempt| backoff.base_delay(attempt).as_secs())
      .collect::<Vec<_>>();
    assert_eq!(delays, vec![1, 3, 9, 12, 12]);
  }

  #[test]
  fn backoff_gives_up() {
    let mut backoff = Backoff {
      max_tries: Some(2),
      jitter: Duration::ZERO,
      ..DEFAULT_BACKOFF
    };
    assert_eq!(backoff.next_delay(1), Some(Duration::from_secs(1)));
    assert_eq!(backoff.next_delay(2), Some(Duration::from_secs(3)));
    assert_eq!(backoff.next_delay(3), None);
  }

  #[tokio::test(start_paused = true)]
  async fn retries_until_success() {
    let start = Instant::now();
    let mut failures = 2;
    let mut policy = |_: u32| Some(Duration::from_secs(5));
    let result = retry(&mut policy, || {
      let result = if failures > 0 {
        failures -= 1;
        Err(ConnectError::Timeout)
      } else {
        Ok(Instant::now())
      };
      async move { result }
    })
    .await
    .unwrap();

    assert_eq!(result - start, Duration::from_secs(10));
  }

  #[tokio::test(start_paused = true)]
  async fn auth_errors_are_not_retried() {
    let mut policy = |_: u32| Some(Duration::from_secs(5));
    let error = retry(&mut policy, || async {
      Err::<(), _>(ConnectError::Auth("Login authentication failed".into()))
    })
    .await
    .unwrap_err();

    assert_eq!(error.attempts, 1);
    assert!(matches!(error.cause, ConnectError::Auth(_)));
  }

  #[tokio::test(start_paused = true)]
  async fn gives_up_when_policy_says_so() {
    let mut policy = |attempt: u32| (attempt < 3).then_some(Duration::from_secs(1));
    let error = retry(&mut policy, || async { Err::<(), _>(ConnectError::Timeout) })
      .await
      .unwrap_err();

    assert_eq!(error.attempts, 3);
    assert!(matches!(error.cause, ConnectError::Timeout));
  }
}
