//! ## Sliding-window rate limiting
//!
//! [`RateLimiter`] remembers when actions happened and tells you how long to
//! wait before the next one. [`Queue`] puts jobs in front of one or more
//! limiters and releases them in FIFO order as the limiters allow.
//!
//! Both take the current time as an argument where it matters, so that the
//! owner decides what "now" is. The convenience methods without a `now`
//! argument use [`Instant::now`], which respects a paused tokio clock.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// At most `limit` actions per `duration`, and at least `delay` between two actions.
#[derive(Clone, Debug)]
pub struct RateLimiter {
  limit: usize,
  duration: Duration,
  delay: Duration,
  times: VecDeque<Instant>,
}

impl RateLimiter {
  /// Allow `limit` actions per `duration`.
  ///
  /// A `limit` of zero is treated as one.
  pub fn new(limit: usize, duration: Duration) -> Self {
    Self {
      limit: limit.max(1),
      duration,
      delay: Duration::ZERO,
      times: VecDeque::with_capacity(limit),
    }
  }

  /// Require at least `delay` between two consecutive actions.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn limit(&self) -> usize {
    self.limit
  }

  pub fn duration(&self) -> Duration {
    self.duration
  }

  pub fn delay(&self) -> Duration {
    self.delay
  }

  /// Record an action at `now`.
  pub fn add_at(&mut self, now: Instant) {
    match self.times.back() {
      Some(last) if *last > now => {
        let i = self.times.partition_point(|time| *time <= now);
        self.times.insert(i, now);
      }
      _ => self.times.push_back(now),
    }
  }

  /// Record an action now.
  pub fn add(&mut self) {
    self.add_at(Instant::now())
  }

  /// How long to wait at `now` before another action is allowed.
  pub fn next_at(&mut self, now: Instant) -> Duration {
    self.prune(now);

    let delay = match self.times.back() {
      Some(last) => self.delay.saturating_sub(now.saturating_duration_since(*last)),
      None => Duration::ZERO,
    };
    if self.times.len() < self.limit {
      return delay;
    }

    let oldest = self.times[self.times.len() - self.limit];
    let window = (oldest + self.duration).saturating_duration_since(now);
    delay.max(window)
  }

  /// How long to wait before another action is allowed.
  pub fn next(&mut self) -> Duration {
    self.next_at(Instant::now())
  }

  /// How many actions fit in the window at `now`.
  pub fn remaining_at(&mut self, now: Instant) -> usize {
    self.prune(now);
    self.limit.saturating_sub(self.times.len())
  }

  /// How many actions fit in the window right now.
  pub fn remaining(&mut self) -> usize {
    self.remaining_at(Instant::now())
  }

  /// Forget every recorded action.
  pub fn reset(&mut self) {
    self.times.clear();
  }

  fn prune(&mut self, now: Instant) {
    while let Some(front) = self.times.front() {
      if *front + self.duration > now {
        break;
      }
      self.times.pop_front();
    }
  }
}

/// A FIFO of jobs released through one or more [`RateLimiter`]s.
///
/// The queue does not run anything on its own. Its owner either drives it
/// with [`Queue::ready_at`] and [`Queue::pop_ready`], or hands it a job
/// executor with [`Queue::run`].
#[derive(Debug)]
pub struct Queue<J> {
  limiters: Vec<RateLimiter>,
  jobs: VecDeque<J>,
  size: Option<usize>,
}

impl<J> Queue<J> {
  pub fn new(limiter: RateLimiter) -> Self {
    Self {
      limiters: vec![limiter],
      jobs: VecDeque::new(),
      size: None,
    }
  }

  /// Also respect `limiter`.
  pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
    self.limiters.push(limiter);
    self
  }

  /// Hold at most `size` pending jobs.
  pub fn with_size(mut self, size: usize) -> Self {
    self.size = Some(size);
    self
  }

  /// Append `job`.
  ///
  /// If the queue is full, `job` is handed back and nothing is queued.
  pub fn queue(&mut self, job: J) -> Result<(), J> {
    if self.is_full() {
      return Err(job);
    }
    self.jobs.push_back(job);
    Ok(())
  }

  /// Put `job` at the front.
  ///
  /// If the queue is full, the job at the back is evicted and returned.
  pub fn queue_first(&mut self, job: J) -> Option<J> {
    let evicted = if self.is_full() {
      self.jobs.pop_back()
    } else {
      None
    };
    self.jobs.push_front(job);
    evicted
  }

  /// How long the head of the queue has to wait at `now`.
  pub fn wait_at(&mut self, now: Instant) -> Duration {
    self
      .limiters
      .iter_mut()
      .map(|limiter| limiter.next_at(now))
      .max()
      .unwrap_or(Duration::ZERO)
  }

  /// When the head of the queue may run, or `None` if the queue is empty.
  pub fn ready_at(&mut self, now: Instant) -> Option<Instant> {
    if self.jobs.is_empty() {
      return None;
    }
    Some(now + self.wait_at(now))
  }

  /// Take the head of the queue if the limiters allow it at `now`,
  /// recording `now` in every limiter.
  pub fn pop_ready(&mut self, now: Instant) -> Option<J> {
    if self.jobs.is_empty() || !self.wait_at(now).is_zero() {
      return None;
    }
    let job = self.jobs.pop_front()?;
    for limiter in &mut self.limiters {
      limiter.add_at(now);
    }
    Some(job)
  }

  /// Run jobs with `exec` until the queue is empty, sleeping in between
  /// as long as the limiters require.
  ///
  /// Jobs run one at a time, in order.
  pub async fn run<F, Fut>(&mut self, mut exec: F)
  where
    F: FnMut(J) -> Fut,
    Fut: Future<Output = ()>,
  {
    while let Some(at) = self.ready_at(Instant::now()) {
      tokio::time::sleep_until(at).await;
      if let Some(job) = self.pop_ready(Instant::now()) {
        exec(job).await;
      }
    }
  }

  /// Smallest remaining budget over all limiters at `now`.
  pub fn remaining_at(&mut self, now: Instant) -> usize {
    self
      .limiters
      .iter_mut()
      .map(|limiter| limiter.remaining_at(now))
      .min()
      .unwrap_or(usize::MAX)
  }

  pub fn len(&self) -> usize {
    self.jobs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.jobs.is_empty()
  }

  fn is_full(&self) -> bool {
    self.size.is_some_and(|size| self.jobs.len() >= size)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
  }

  #[test]
  fn empty_window_allows_immediately() {
    let now = Instant::now();
    let mut limiter = RateLimiter::new(3, ms(100)).with_delay(ms(50));
    assert_eq!(limiter.next_at(now), Duration::ZERO);
    assert_eq!(limiter.remaining_at(now), 3);
  }

  #[test]
  fn delay_applies_with_capacity_left() {
    let t0 = Instant::now();
    let mut limiter = RateLimiter::new(3, ms(100)).with_delay(ms(50));
    limiter.add_at(t0);
    assert_eq!(limiter.next_at(t0 + ms(10)), ms(40));
    assert_eq!(limiter.next_at(t0 + ms(60)), Duration::ZERO);
    assert_eq!(limiter.remaining_at(t0 + ms(10)), 2);
  }

  #[test]
  fn full_window_waits_for_oldest_entry() {
    let t0 = Instant::now();
    let mut limiter = RateLimiter::new(3, ms(100)).with_delay(ms(50));
    limiter.add_at(t0);
    limiter.add_at(t0);
    limiter.add_at(t0);

    let wait = limiter.next_at(t0 + ms(10));
    assert!(wait >= ms(100 - 10), "{wait:?}");
    assert_eq!(wait, ms(90));
    assert_eq!(limiter.remaining_at(t0 + ms(10)), 0);
  }

  #[test]
  fn window_slides() {
    let t0 = Instant::now();
    let mut limiter = RateLimiter::new(2, ms(100));
    limiter.add_at(t0);
    limiter.add_at(t0 + ms(40));
    assert_eq!(limiter.next_at(t0 + ms(50)), ms(50));
    // the first entry leaves the window at exactly t0 + 100
    assert_eq!(limiter.next_at(t0 + ms(100)), Duration::ZERO);
    assert_eq!(limiter.remaining_at(t0 + ms(100)), 1);
    assert_eq!(limiter.remaining_at(t0 + ms(140)), 2);
  }

  #[test]
  fn out_of_order_adds_stay_sorted() {
    let t0 = Instant::now();
    let mut limiter = RateLimiter::new(2, ms(100));
    limiter.add_at(t0 + ms(50));
    limiter.add_at(t0);
    assert_eq!(limiter.next_at(t0 + ms(60)), ms(40));
  }

  #[test]
  fn queue_drops_when_full() {
    let mut queue = Queue::new(RateLimiter::new(1, ms(100))).with_size(2);
    assert_eq!(queue.queue(1), Ok(()));
    assert_eq!(queue.queue(2), Ok(()));
    assert_eq!(queue.queue(3), Err(3));
    assert_eq!(queue.queue_first(0), Some(2));
    assert_eq!(queue.len(), 2);

    let now = Instant::now();
    assert_eq!(queue.pop_ready(now), Some(0));
    assert_eq!(queue.pop_ready(now), None);
    assert_eq!(queue.ready_at(now), Some(now + ms(100)));
    assert_eq!(queue.pop_ready(now + ms(100)), Some(1));
    assert_eq!(queue.ready_at(now + ms(100)), None);
  }

  #[test]
  fn queue_respects_every_limiter() {
    let t0 = Instant::now();
    let mut queue = Queue::new(RateLimiter::new(3, ms(1000)))
      .with_limiter(RateLimiter::new(4, ms(60_000)));
    for i in 0..5 {
      queue.queue(i).unwrap();
    }

    let mut now = t0;
    let mut released = Vec::new();
    while let Some(at) = queue.ready_at(now) {
      now = at;
      released.push((queue.pop_ready(now).unwrap(), now - t0));
    }

    assert_eq!(
      released,
      vec![
        (0, ms(0)),
        (1, ms(0)),
        (2, ms(0)),
        (3, ms(1000)),
        (4, ms(60_000)),
      ]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn run_drains_in_order() {
    let mut queue = Queue::new(RateLimiter::new(2, ms(100)).with_delay(ms(10))).with_size(5);
    for i in 0..5 {
      queue.queue(i).unwrap();
    }
    assert_eq!(queue.queue(5), Err(5));

    let start = Instant::now();
    let mut ran = Vec::new();
    queue
      .run(|job| {
        ran.push((job, Instant::now() - start));
        async {}
      })
      .await;

    assert!(queue.is_empty());
    assert_eq!(
      ran,
      vec![
        (0, ms(0)),
        (1, ms(10)),
        (2, ms(100)),
        (3, ms(110)),
        (4, ms(200)),
      ]
    );
  }
}
