//! Bounded in-request retry shared by every gateway.

use crate::{GatewayError, GatewayResult};
use rand::Rng;
use rsvp_config_and_utils::GatewaySettings;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for one gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Cap on the un-jittered delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&GatewaySettings::default())
    }
}

impl From<&GatewaySettings> for RetryPolicy {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Un-jittered delay after failed attempt number `attempt` (1-based).
    ///
    /// `min(base * 2^(attempt - 1), max)`:
    ///
    /// | Attempt | Delay (base=1s, max=10s) |
    /// |---------|--------------------------|
    /// | 1       | 1s                       |
    /// | 2       | 2s                       |
    /// | 3       | 4s                       |
    /// | 4       | 8s                       |
    /// | 5+      | 10s                      |
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let shift = attempt.saturating_sub(1);
        let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
    }

    /// Apply +/-50% jitter to `delay`.
    pub fn jitter_with<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
        delay.mul_f64(rng.gen_range(0.5..=1.5))
    }

    fn jittered_delay_for(&self, attempt: u32) -> Duration {
        Self::jitter_with(self.delay_for(attempt), &mut rand::thread_rng())
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Gateway call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts || !e.is_retryable() => {
                warn!(operation, attempt, error = %e, "Gateway call failed");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.jittered_delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    rate_limited = e.is_rate_limited(),
                    error = %e,
                    "Gateway call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Shorthand used by fakes and tests: an always-retryable upstream failure.
pub fn unavailable(provider: &'static str) -> GatewayError {
    GatewayError::Api {
        provider,
        status: 503,
        message: "service unavailable".to_string(),
    }
}
