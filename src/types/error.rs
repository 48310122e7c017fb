//! Error types for the wallet cache
//!
//! This module defines all error types that can occur while serving balance
//! operations and while persisting them.
//!
//! # Error Categories
//!
//! - **Business rule violations**: insufficient funds, unknown account, invalid amount.
//!   Returned to the caller, never retried.
//! - **Transient infrastructure failures**: concurrency conflicts and admission timeouts.
//!   Conflicts are retried locally before surfacing.
//! - **Persistence failures**: raised by the durable store. Inside the flusher they are
//!   logged and retried on the next tick; they never reach foreground requests.
//! - **File I/O and CSV errors**: only produced by the replay CLI.

use super::money::Money;
use super::operation::AccountId;
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the wallet cache
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    /// A debit asked for more than the current balance
    ///
    /// The balance is left unchanged and the attempt is journaled as failed.
    #[error("Insufficient funds for account {account}: current {current}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        current: Money,
        requested: Money,
    },

    /// The account has no durable row
    ///
    /// Only raised on the strict path, where reads require the row to exist.
    #[error("Account {account} not found")]
    AccountUnknown { account: AccountId },

    /// Concurrent modifications kept winning until the retry bound ran out
    #[error("Concurrent modification of account {account}, gave up after {attempts} attempts")]
    ConcurrencyConflict { account: AccountId, attempts: u32 },

    /// No admission slot became free in time
    ///
    /// The system is overloaded; callers should back off and retry later.
    #[error("Admission timed out after {}ms", waited.as_millis())]
    AdmissionTimeout { waited: Duration },

    /// The durable store failed
    #[error("Durable persistence failed: {message}")]
    DurablePersistence { message: String },

    /// Amount was zero or negative
    #[error("Invalid amount '{amount}': must be positive")]
    InvalidAmount { amount: Money },

    /// Amount is too large to be held as an account balance
    #[error("Amount '{amount}' is outside the supported balance range")]
    AmountOutOfRange { amount: Money },

    /// The balance would leave the representable range
    #[error("Arithmetic overflow on account {account}")]
    ArithmeticOverflow { account: AccountId },

    /// The service has been shut down and admits no more operations
    #[error("Wallet service is shut down")]
    Shutdown,

    /// I/O error while reading or writing files
    #[error("I/O error: {message}")]
    IoError { message: String },

    /// CSV parsing error
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError { line: Option<u64>, message: String },
}

impl WalletError {
    pub fn insufficient_funds(account: AccountId, current: Money, requested: Money) -> Self {
        WalletError::InsufficientFunds {
            account,
            current,
            requested,
        }
    }

    pub fn account_unknown(account: AccountId) -> Self {
        WalletError::AccountUnknown { account }
    }

    pub fn concurrency_conflict(account: AccountId, attempts: u32) -> Self {
        WalletError::ConcurrencyConflict { account, attempts }
    }

    pub fn admission_timeout(waited: Duration) -> Self {
        WalletError::AdmissionTimeout { waited }
    }

    pub fn durable_persistence(message: impl Into<String>) -> Self {
        WalletError::DurablePersistence {
            message: message.into(),
        }
    }

    /// Business rule violations are reported to the caller and journaled as
    /// failed operations; everything else is an infrastructure failure.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            WalletError::InsufficientFunds { .. }
                | WalletError::AccountUnknown { .. }
                | WalletError::InvalidAmount { .. }
                | WalletError::AmountOutOfRange { .. }
                | WalletError::ArithmeticOverflow { .. }
        )
    }
}

impl From<StoreError> for WalletError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { account } => WalletError::AccountUnknown { account },
            // a single lost race; ConflictRetry replaces the count once exhausted
            StoreError::Conflict { account } => WalletError::ConcurrencyConflict {
                account,
                attempts: 1,
            },
            StoreError::Unavailable { message } => WalletError::DurablePersistence { message },
        }
    }
}

impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        WalletError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for WalletError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        WalletError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}
