use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

pub trait Timeout: Sized {
  fn timeout(self, duration: Duration) -> tokio::time::Timeout<Self>;
}

impl<F> Timeout for F
where
  F: Future,
{
  fn timeout(self, duration: Duration) -> tokio::time::Timeout<Self> {
    tokio::time::timeout(duration, self)
  }
}

/// Sleep until `deadline`, or forever if there is none.
pub async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}

/// `base` shifted by a random amount in `-jitter..=jitter`.
pub fn jitter(base: Duration, jitter: Duration) -> Duration {
  use rand::Rng as _;

  if jitter.is_zero() {
    return base;
  }
  let jitter = jitter.as_millis() as i64;
  let offset = rand::thread_rng().gen_range(-jitter..=jitter);
  let millis = (base.as_millis() as i64 + offset).max(0);
  Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn jitter_stays_in_range() {
    let base = Duration::from_secs(300);
    let spread = Duration::from_secs(30);
    for _ in 0..100 {
      let value = jitter(base, spread);
      assert!(value >= base - spread && value <= base + spread, "{value:?}");
    }
    assert_eq!(jitter(base, Duration::ZERO), base);
  }

  #[tokio::test(start_paused = true)]
  async fn missing_deadline_never_fires() {
    let result = sleep_until(None).timeout(Duration::from_secs(3600)).await;
    assert!(result.is_err());
  }
}
