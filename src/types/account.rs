//! Durable account row
//!
//! The persisted representation of an account balance. The in-memory cell in
//! the balance cache and this row describe the same entity; the flusher
//! reconciles them.

use super::money::Money;
use super::operation::AccountId;

/// Account balance as stored durably
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    pub account: AccountId,

    /// Never negative.
    pub balance: Money,

    /// Incremented on every durable write. Used as the optimistic lock token on
    /// the strict per-request path.
    pub version: u64,
}

impl AccountBalance {
    /// A freshly created row: zero balance, version 0.
    pub fn new(account: AccountId) -> Self {
        AccountBalance {
            account,
            balance: Money::ZERO,
            version: 0,
        }
    }
}
