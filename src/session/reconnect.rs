//! Reconnection policy.
//!
//! Sessions never reconnect on their own. A caller that wants retries wraps
//! its open call in [`retry_open`], which builds a fresh session (and so a
//! fresh connection id) on each attempt. Only transport failures are retried;
//! an authorization failure ends the loop immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Give up after the first failure
    #[default]
    Never,
    /// Wait `initial`, doubling each time up to `max_delay`, at most `max_retries` times
    ExponentialBackoff {
        initial: Duration,
        max_delay: Duration,
        max_retries: u32,
    },
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based), or `None` when retries are exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match *self {
            ReconnectPolicy::Never => None,
            ReconnectPolicy::ExponentialBackoff {
                initial,
                max_delay,
                max_retries,
            } => {
                if attempt == 0 || attempt > max_retries {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempt - 1);
                Some(initial.saturating_mul(factor).min(max_delay))
            }
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            ReconnectPolicy::Never => 0,
            ReconnectPolicy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }
}

/// Runs `open` until it succeeds, fails with a non-transport error, or the
/// policy runs out of retries.
pub async fn retry_open<T, F, Fut>(policy: &ReconnectPolicy, mut open: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 0;
    loop {
        match open().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transport() => {
                attempt += 1;
                let Some(delay) = policy.delay_for_attempt(attempt) else {
                    return Err(err);
                };
                warn!("Open failed ({}); retry {} in {:?}", err, attempt, delay);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
