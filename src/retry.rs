//! Fixed-delay retry loop.
//!
//! Every error is treated as retryable. When all attempts fail the loop
//! returns `None` instead of an error so callers can degrade.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Default number of attempts per call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts in seconds
pub const DEFAULT_DELAY_SECS: u64 = 60;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of invocations before giving up
    pub max_attempts: u32,
    /// Sleep between two consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy making `max_attempts` invocations `delay` apart
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_DELAY_SECS),
        }
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` invocations have failed.
///
/// `op` receives the 1-based attempt number. No sleep follows the final attempt.
pub async fn retry_fixed<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => return Some(value),
            Err(e) => {
                warn!(
                    label = label,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Attempt failed"
                );
                if attempt < policy.max_attempts {
                    info!(
                        label = label,
                        wait_secs = policy.delay.as_secs(),
                        "Retrying after fixed delay"
                    );
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    warn!(
        label = label,
        max_attempts = policy.max_attempts,
        "Giving up after all attempts failed"
    );
    None
}
