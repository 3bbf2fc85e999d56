//! Shared retry/backoff discipline for calls to unreliable upstream services.
//!
//! Every outbound AI call goes through [`BackoffPolicy::run`]: retryable errors
//! sleep `base_delay * 2^attempt` (plus jitter, capped at `max_delay`) before the
//! next try, non-retryable errors return on the first failure.

use rand::Rng;
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Classification hook for errors that flow through [`BackoffPolicy`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Provider-supplied wait hint, used as a floor for the next delay.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay added as random jitter (0.0 disables it).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.1,
        }
    }
}

/// Terminal result of a retried operation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with an error the predicate refused to retry.
    Rejected(E),
    /// Every attempt failed; carries the last error.
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Rejected(err) => err,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    pub fn error(&self) -> &E {
        match self {
            RetryError::Rejected(err) => err,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let base = self.delay_for(attempt);
        let extra = if self.jitter > 0.0 {
            let fraction = rand::rng().random_range(0.0..=self.jitter);
            base.mul_f64(fraction)
        } else {
            Duration::ZERO
        };
        let delay = (base + extra).min(self.max_delay);
        match hint {
            Some(hint) if hint > delay => hint.min(self.max_delay),
            _ => delay,
        }
    }

    /// Runs `operation` using [`Retryable::is_retryable`] as the predicate.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with(operation, |err: &E| err.is_retryable(), |err: &E| err.retry_after())
            .await
    }

    pub async fn run_with<T, E, F, Fut, P, H>(
        &self,
        mut operation: F,
        is_retryable: P,
        retry_hint: H,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        H: Fn(&E) -> Option<Duration>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => {
                    debug!(target = "hermes.retry", attempt, error = %err, "non_retryable_error");
                    return Err(RetryError::Rejected(err));
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(target = "hermes.retry", attempts = attempt, error = %err, "retries_exhausted");
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    let delay = self.jittered_delay(attempt - 1, retry_hint(&err));
                    warn!(
                        target = "hermes.retry",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying_after_error"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
