//! Time source for the polling loop.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Where the poller reads time from and how it sleeps.
#[async_trait]
pub trait Clock: Send + Sync {
  fn now(&self) -> Instant;

  async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
  fn now(&self) -> Instant {
    Instant::now()
  }

  async fn sleep(&self, duration: Duration) {
    tokio::time::sleep(duration).await;
  }
}

/// Virtual time for tests.
///
/// `sleep` returns immediately, advances the clock by the requested duration
/// and records it, so a test can assert how often and how long a loop slept.
#[derive(Debug)]
pub struct ManualClock {
  origin: Instant,
  elapsed: Mutex<Duration>,
  sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self {
      origin: Instant::now(),
      elapsed: Mutex::new(Duration::ZERO),
      sleeps: Mutex::new(Vec::new()),
    }
  }

  /// Move time forward without recording a sleep.
  pub fn advance(&self, duration: Duration) {
    let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
    *elapsed += duration;
  }

  /// Total virtual time passed since creation.
  pub fn elapsed(&self) -> Duration {
    *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Every duration passed to `sleep`, in call order.
  pub fn sleeps(&self) -> Vec<Duration> {
    self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Clock for ManualClock {
  fn now(&self) -> Instant {
    self.origin + self.elapsed()
  }

  async fn sleep(&self, duration: Duration) {
    self
      .sleeps
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(duration);
    self.advance(duration);
  }
}
