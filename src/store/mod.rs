//! Durable storage collaborator
//!
//! The wallet cache does not implement durable storage itself. It consumes a
//! transactional store through the [`DurableStore`] trait: balance rows with a
//! version column, plus an append-only operation log.
//!
//! [`InMemoryStore`] is an in-process implementation used by the replay CLI,
//! the benchmark and the tests.

use crate::types::{AccountId, Money, OperationRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryStore;

/// Errors reported by a durable store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No row exists for the account
    #[error("no durable row for account {account}")]
    NotFound { account: AccountId },

    /// The row changed since it was read; the lock token is stale
    #[error("stale lock token for account {account}")]
    Conflict { account: AccountId },

    /// The store could not complete the request
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

/// Proof of a `load_for_update` read
///
/// Carries the row version observed by the read. A `save` with a token whose
/// version no longer matches the row fails with [`StoreError::Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken {
    pub version: u64,
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version)
    }
}

/// Transactional balance storage
///
/// Every method is one durable transaction. Implementations must be safe to
/// call from many tasks at once.
#[async_trait]
pub trait DurableStore: Send + Sync + fmt::Debug {
    /// Read the current durable balance
    async fn load(&self, account: AccountId) -> Result<Money, StoreError>;

    /// Create the row with a zero balance. Idempotent: an existing row is left untouched.
    async fn create(&self, account: AccountId) -> Result<(), StoreError>;

    /// Overwrite many balances in a single transaction
    ///
    /// Values are absolute, not deltas. Each written row's version is bumped.
    async fn batch_update_balances(
        &self,
        balances: &HashMap<AccountId, Money>,
    ) -> Result<(), StoreError>;

    /// Append operation records, preserving their order
    async fn append_operations(&self, records: &[OperationRecord]) -> Result<(), StoreError>;

    /// Exclusive read used by the strict per-request path
    async fn load_for_update(&self, account: AccountId) -> Result<(Money, LockToken), StoreError>;

    /// Write a balance read through `load_for_update`
    ///
    /// Fails with [`StoreError::Conflict`] if the row was written after the token was issued.
    async fn save(
        &self,
        account: AccountId,
        balance: Money,
        token: LockToken,
    ) -> Result<(), StoreError>;
}
