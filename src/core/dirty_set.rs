//! Accounts whose cached balance has not reached the durable store yet
//!
//! Maps account id to the latest balance reported for it. Each mutation
//! overwrites the entry, so only the newest value per account is ever flushed.
//! The flusher drains entries by removing them one key at a time; a mutation
//! that lands after its key was removed simply re-dirties the account for the
//! following tick.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::types::{AccountId, Money};

#[derive(Debug, Default)]
pub struct DirtySet {
    entries: DashMap<AccountId, Money>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the account's latest balance, replacing any older entry
    pub fn mark(&self, account: AccountId, balance: Money) {
        self.entries.insert(account, balance);
    }

    /// Remove and return up to `max` entries
    pub fn drain(&self, max: usize) -> HashMap<AccountId, Money> {
        // collect keys first: removing while iterating would deadlock on the shard
        let keys: Vec<AccountId> = self
            .entries
            .iter()
            .take(max)
            .map(|entry| *entry.key())
            .collect();

        keys.into_iter()
            .filter_map(|account| self.entries.remove(&account))
            .collect()
    }

    /// Return a batch that could not be persisted
    ///
    /// Accounts re-dirtied in the meantime keep their newer value.
    pub fn restore(&self, batch: HashMap<AccountId, Money>) {
        for (account, balance) in batch {
            self.entries.entry(account).or_insert(balance);
        }
    }

    pub fn contains(&self, account: AccountId) -> bool {
        self.entries.contains_key(&account)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
