//! Bounded retry with exponential backoff for conflicting durable writes
//!
//! Used only on the strict path, where each request reads and writes the
//! durable row directly and can lose an optimistic-lock race. The wrapped
//! attempt is re-executed against fresh state; operations are never merged or
//! reordered.

use std::future::Future;
use std::time::Duration;

use log::debug;

use crate::config::RetryConfig;
use crate::types::{AccountId, WalletError};

#[derive(Debug, Clone)]
pub struct ConflictRetry {
    max_attempts: u32,
    base_delay: Duration,
}

impl ConflictRetry {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based): base, 2×base, 4×base, …
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Run `attempt` until it stops reporting a concurrency conflict
    ///
    /// Any other error, business or infrastructure, is returned immediately.
    /// When every attempt conflicts the result is `ConcurrencyConflict` with the
    /// number of attempts made.
    pub async fn run<T, F, Fut>(&self, account: AccountId, mut attempt: F) -> Result<T, WalletError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WalletError>>,
    {
        let mut tries = 1;
        loop {
            match attempt().await {
                Err(WalletError::ConcurrencyConflict { .. }) if tries < self.max_attempts => {
                    let delay = self.backoff(tries);
                    debug!(
                        "Retry attempt {} for account {}, waiting {} ms",
                        tries,
                        account,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
                Err(WalletError::ConcurrencyConflict { .. }) => {
                    debug!("Max retry attempts reached for account {}", account);
                    return Err(WalletError::concurrency_conflict(account, tries));
                }
                other => return other,
            }
        }
    }
}
