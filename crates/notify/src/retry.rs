//! Retry with Exponential Backoff

use crate::{Channel, ChannelError};
use alert_model::Alert;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry policy for channel operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 3)
    pub max_attempts: u32,
    /// Delay before the second attempt (default: 100ms)
    pub initial_interval: Duration,
    /// Upper bound for any single delay (default: 5s)
    pub max_interval: Duration,
    /// Growth factor per attempt (default: 2.0)
    pub multiplier: f64,
    /// Random spread as a fraction of the delay (default: 0.1)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based), for a jitter
    /// sample in `[-1, 1]`:
    /// `min(initial × multiplier^(attempt-1) × (1 + sample × jitter), max)`
    pub fn delay_with_jitter(&self, attempt: u32, sample: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let jittered = base * (1.0 + sample.clamp(-1.0, 1.0) * self.jitter_factor);
        if jittered.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(jittered.clamp(0.0, self.max_interval.as_secs_f64()))
    }

    /// Delay after failed attempt `attempt` with a random jitter sample
    pub fn backoff(&self, attempt: u32) -> Duration {
        let sample = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        self.delay_with_jitter(attempt, sample)
    }
}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T, ChannelError>,
    /// Attempts actually made
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// `op` receives the 1-based attempt number. Waits between attempts end
/// early with [`ChannelError::Cancelled`] when `cancel` fires.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> RetryReport<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ChannelError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return RetryReport {
                result: Err(ChannelError::Cancelled),
                attempts: attempt - 1,
            };
        }

        let err = match op(attempt).await {
            Ok(value) => {
                return RetryReport {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(err) => err,
        };

        if !err.is_transient() || attempt >= max_attempts {
            debug!("Giving up after attempt {}: {}", attempt, err);
            return RetryReport {
                result: Err(err),
                attempts: attempt,
            };
        }

        let delay = policy.backoff(attempt);
        warn!(
            "Attempt {}/{} failed: {}, retrying in {:?}",
            attempt, max_attempts, err, delay
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return RetryReport {
                    result: Err(ChannelError::Cancelled),
                    attempts: attempt,
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

/// Decorator that retries transient failures of any channel
pub struct RetryingChannel<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: Channel> RetryingChannel<C> {
    /// Wrap `inner` with `policy`
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Deliver with retries, aborting waits when `cancel` fires
    pub async fn deliver_with(&self, alert: &Alert, cancel: &CancellationToken) -> RetryReport<String> {
        retry(&self.policy, cancel, |_| self.inner.deliver(alert)).await
    }

    /// Update with retries, aborting waits when `cancel` fires
    pub async fn update_with(
        &self,
        external_id: &str,
        alert: &Alert,
        cancel: &CancellationToken,
    ) -> RetryReport<()> {
        retry(&self.policy, cancel, |_| {
            self.inner.update_existing(external_id, alert)
        })
        .await
    }
}

#[async_trait]
impl<C: Channel> Channel for RetryingChannel<C> {
    fn identify(&self) -> &str {
        self.inner.identify()
    }

    async fn deliver(&self, alert: &Alert) -> Result<String, ChannelError> {
        self.deliver_with(alert, &CancellationToken::new()).await.result
    }

    async fn update_existing(&self, external_id: &str, alert: &Alert) -> Result<(), ChannelError> {
        self.update_with(external_id, alert, &CancellationToken::new())
            .await
            .result
    }
}
