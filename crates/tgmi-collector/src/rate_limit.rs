//! Waiting policies for talking to the external source.
//!
//! Two separate loops live here:
//!
//! - [`retry_with_backoff`] retries network-level failures (timeouts,
//!   connection resets, 5xx) inside the HTTP source with exponential backoff
//!   and jitter.
//! - [`suspend_while_rate_limited`] wraps a single collector step. When the
//!   source answers with [`SourceError::RateLimited`] the calling task sleeps
//!   for exactly the requested duration and repeats the same step, so nothing
//!   collected so far is lost.

use std::future::Future;
use std::time::Duration;

use crate::error::{CollectorError, SourceError};

/// Returns `true` for network-level failures worth retrying after a delay.
///
/// Rate-limit signals are deliberately excluded: they are handled by
/// [`suspend_while_rate_limited`] at the collector's task boundary.
pub(crate) fn is_transient(err: &SourceError) -> bool {
    match err {
        SourceError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        SourceError::UnexpectedStatus { status, .. } => *status >= 500,
        SourceError::RateLimited { .. }
        | SourceError::ChannelNotFound { .. }
        | SourceError::Deserialize { .. }
        | SourceError::InvalidUrl { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Back-off schedule with `backoff_base_ms = 1_000`:
///
/// | Attempt | Sleep before next attempt        |
/// |---------|----------------------------------|
/// | 1       | 1 000 ms × 2⁰ ± 25 % jitter     |
/// | 2       | 1 000 ms × 2¹ ± 25 % jitter     |
/// | 3       | 1 000 ms × 2² ± 25 % jitter     |
///
/// Delay is capped at 60 s. Non-transient errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient source error, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Rate-limit suspensions left for one channel collection.
///
/// Shared by every page and media call of the channel, so the bound holds
/// for the whole collection rather than per call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitBudget {
    used: u32,
    max: u32,
}

impl WaitBudget {
    pub(crate) fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    pub(crate) fn used(self) -> u32 {
        self.used
    }
}

/// Runs `step`, sleeping for the source-requested duration and re-running the
/// same step each time it reports [`SourceError::RateLimited`].
///
/// Each suspension draws from `budget`; once it is spent the channel fails
/// with [`CollectorError::RateLimitExhausted`]. Any other error is returned
/// immediately.
pub(crate) async fn suspend_while_rate_limited<T, F, Fut>(
    channel: &str,
    budget: &mut WaitBudget,
    mut step: F,
) -> Result<T, CollectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    loop {
        match step().await {
            Ok(value) => return Ok(value),
            Err(SourceError::RateLimited {
                retry_after_secs, ..
            }) => {
                if budget.used >= budget.max {
                    return Err(CollectorError::RateLimitExhausted {
                        channel: channel.to_string(),
                        waits: budget.used,
                    });
                }
                budget.used += 1;
                tracing::warn!(
                    channel,
                    retry_after_secs,
                    waits = budget.used,
                    max_waits = budget.max,
                    "source rate limit hit, suspending channel collection"
                );
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
            }
            Err(other) => return Err(other.into()),
        }
    }
}
