use std::future::Future;
use std::time::Duration;

/// Retries with a linearly growing delay: `base`, `2 * base`, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub base_delay: Duration,
}

impl RetryPolicy {
  pub fn new(attempts: u32, base_delay: Duration) -> Self {
    Self {
      attempts: attempts.max(1),
      base_delay,
    }
  }

  /// Delay after the given failed attempt, counting from 1.
  pub fn delay(&self, attempt: u32) -> Duration {
    self.base_delay * attempt
  }

  /// Run `operation` until it succeeds or the attempts are used up. The
  /// operation receives the attempt number.
  pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let mut attempt = 1;
    loop {
      match operation(attempt).await {
        Ok(value) => return Ok(value),
        Err(err) if attempt >= self.attempts => return Err(err),
        Err(_) => {
          tokio::time::sleep(self.delay(attempt)).await;
          attempt += 1;
        }
      }
    }
  }
}
