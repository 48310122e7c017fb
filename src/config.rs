//! Service configuration
//!
//! Every tunable of the wallet service lives here: the consistency mode, the
//! admission gate, the conflict retry policy and the flush schedule. Each
//! section has sensible defaults and a validating constructor that replaces
//! invalid (zero) values with the default and logs a warning.

use log::warn;
use std::time::Duration;

/// How mutations reach durable storage
///
/// Chosen once per service instance. Mixing modes per request is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyMode {
    /// Mutate the in-memory cache and persist asynchronously. Durable state lags
    /// by at most one flush interval.
    #[default]
    WriteBack,

    /// Read-lock-write the durable row on every request, retrying on conflicts.
    Strict,
}

/// Admission gate settings
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    /// Maximum number of mutations in flight across the process
    pub capacity: usize,
    /// How long a request waits for a slot before failing
    pub timeout: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            timeout: Duration::from_secs(10),
        }
    }
}

impl AdmissionConfig {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let default = Self::default();

        let capacity = if capacity == 0 {
            warn!(
                "Invalid admission capacity ({}), using default ({})",
                capacity, default.capacity
            );
            default.capacity
        } else {
            capacity
        };

        Self { capacity, timeout }
    }
}

/// Conflict retry settings for the strict path
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles for every following one
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        let max_attempts = if max_attempts == 0 {
            let default = Self::default().max_attempts;
            warn!(
                "Invalid retry max_attempts ({}), using default ({})",
                max_attempts, default
            );
            default
        } else {
            max_attempts
        };

        Self {
            max_attempts,
            base_delay,
        }
    }
}

/// Flush schedule and batch bounds
#[derive(Debug, Clone, PartialEq)]
pub struct FlushConfig {
    /// Period of the balance sync task
    pub balance_interval: Duration,
    /// Maximum dirty accounts written per balance tick
    pub balance_batch_size: usize,
    /// Period of the operation sync task
    pub operations_interval: Duration,
    /// Maximum records appended per operation tick
    pub operations_batch_size: usize,
    /// Wall-clock budget for draining the journal in one tick
    pub operations_time_budget: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        let operations_interval = Duration::from_millis(1000);
        Self {
            balance_interval: Duration::from_millis(1000),
            balance_batch_size: 1000,
            operations_interval,
            operations_batch_size: 500,
            operations_time_budget: operations_interval / 2,
        }
    }
}

impl FlushConfig {
    /// Build a flush configuration with both tasks ticking every `interval`
    ///
    /// The operation time budget is half the interval.
    pub fn new(
        interval: Duration,
        balance_batch_size: usize,
        operations_batch_size: usize,
    ) -> Self {
        let default = Self::default();

        let interval = if interval.is_zero() {
            warn!(
                "Invalid flush interval ({:?}), using default ({:?})",
                interval, default.balance_interval
            );
            default.balance_interval
        } else {
            interval
        };

        let balance_batch_size = if balance_batch_size == 0 {
            warn!(
                "Invalid balance batch size ({}), using default ({})",
                balance_batch_size, default.balance_batch_size
            );
            default.balance_batch_size
        } else {
            balance_batch_size
        };

        let operations_batch_size = if operations_batch_size == 0 {
            warn!(
                "Invalid operation batch size ({}), using default ({})",
                operations_batch_size, default.operations_batch_size
            );
            default.operations_batch_size
        } else {
            operations_batch_size
        };

        Self {
            balance_interval: interval,
            balance_batch_size,
            operations_interval: interval,
            operations_batch_size,
            operations_time_budget: interval / 2,
        }
    }
}

/// Complete wallet service configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletConfig {
    pub mode: ConsistencyMode,
    pub admission: AdmissionConfig,
    pub retry: RetryConfig,
    pub flush: FlushConfig,
}
