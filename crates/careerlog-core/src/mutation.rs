use std::future::Future;
use std::time::Duration;

use tracing::{
  debug,
  warn
};

use crate::service::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub attempts:   u32,
  pub base_delay: Duration
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      attempts:   3,
      base_delay: Duration::from_millis(500)
    }
  }
}

impl RetryPolicy {
  pub fn none() -> Self {
    Self {
      attempts:   1,
      base_delay: Duration::ZERO
    }
  }

  /// Backoff before attempt `n + 1`,
  /// doubling from the base delay.
  pub fn delay_after(
    &self,
    attempt: u32
  ) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    self.base_delay.saturating_mul(1_u32 << shift)
  }
}

/// Runs a write until it succeeds, the
/// error is not retryable, or the policy's
/// attempts are spent.
pub async fn persist_with_retry<F, Fut>(
  policy: RetryPolicy,
  mut write: F
) -> Result<(), ServiceError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<(), ServiceError>>
{
  let attempts = policy.attempts.max(1);
  let mut attempt = 1;
  loop {
    match write().await {
      | Ok(()) => {
        if attempt > 1 {
          debug!(
            attempt,
            "write succeeded after retry"
          );
        }
        return Ok(());
      }
      | Err(err)
        if err.is_retryable()
          && attempt < attempts =>
      {
        let delay = policy.delay_after(attempt);
        warn!(
          attempt,
          attempts,
          delay_ms = delay.as_millis() as u64,
          error = %err,
          "write failed; retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      | Err(err) => return Err(err)
    }
  }
}

/// Applies `apply` to the local state and
/// notifies at once, then awaits the
/// remote write built by `remote`. On
/// failure `revert` restores the state and
/// observers are notified again.
pub async fn apply_optimistic<S, T, Fut>(
  state: &mut S,
  apply: impl Fn(&mut S),
  revert: impl Fn(&mut S),
  mut notify: impl FnMut(&S),
  remote: impl FnOnce(&S) -> Fut
) -> Result<T, ServiceError>
where
  Fut: Future<Output = Result<T, ServiceError>>
{
  apply(state);
  notify(state);

  let write = remote(state);
  match write.await {
    | Ok(value) => Ok(value),
    | Err(err) => {
      warn!(
        error = %err,
        "optimistic write failed; rolling \
         back"
      );
      revert(state);
      notify(state);
      Err(err)
    }
  }
}
