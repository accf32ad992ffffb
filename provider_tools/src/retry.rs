//! Bounded retry with exponential backoff for outbound provider calls.
//!
//! Only [`ProviderApiError::is_transient`] errors are retried. Once the attempts are used up the last error is wrapped
//! in [`ProviderApiError::Unavailable`], which callers treat as "try again later". A payment must never be moved to a
//! terminal status on the strength of that error alone.
use std::{future::Future, time::Duration};

use log::*;

use crate::ProviderApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay: Duration::from_millis(500), max_delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    /// Delay before the given retry (1-based). Doubles every time, clamped to `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, ProviderApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!("📞️ {label} failed on attempt {attempt}/{max_attempts}. {e}. Retrying in {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(e) if e.is_transient() => {
                error!("📞️ {label} failed after {attempt} attempts. {e}");
                return Err(ProviderApiError::Unavailable(format!("{label}: {e}")));
            },
            Err(e) => {
                debug!("📞️ {label} failed with a permanent error. {e}");
                return Err(e);
            },
        }
    }
}
