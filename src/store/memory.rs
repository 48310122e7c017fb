//! In-process durable store
//!
//! `InMemoryStore` keeps balance rows in a `DashMap` and the operation log in
//! a vector. It honours the [`DurableStore`] contract (versioned rows, stale
//! token detection, all-or-nothing batches) and adds fault injection so tests
//! can exercise conflict and outage paths.

use super::{DurableStore, LockToken, StoreError};
use crate::types::{AccountBalance, AccountId, Money, OperationRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Durable store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: DashMap<AccountId, AccountBalance>,
    operations: Mutex<Vec<OperationRecord>>,

    /// Sizes of committed balance batches, in commit order
    balance_batches: Mutex<Vec<usize>>,

    /// When set, every call fails with `Unavailable`
    unavailable: AtomicBool,

    /// When set, only `append_operations` fails with `Unavailable`
    operations_unavailable: AtomicBool,

    /// Number of upcoming `save` calls that fail with `Conflict`
    pending_conflicts: AtomicU32,

    save_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing the write path
    pub fn insert(&self, account: AccountId, balance: Money) {
        self.rows.insert(
            account,
            AccountBalance {
                account,
                balance,
                version: 0,
            },
        );
    }

    pub fn row(&self, account: AccountId) -> Option<AccountBalance> {
        self.rows.get(&account).map(|row| row.value().clone())
    }

    pub fn rows(&self) -> Vec<AccountBalance> {
        self.rows.iter().map(|row| row.value().clone()).collect()
    }

    pub fn operations(&self) -> Vec<OperationRecord> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn balance_batches(&self) -> Vec<usize> {
        self.balance_batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Simulate a storage outage (or its end)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulate an outage of the operation log alone
    pub fn set_operations_unavailable(&self, unavailable: bool) {
        self.operations_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `save` fail as if another writer got there first
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "in-memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn load(&self, account: AccountId) -> Result<Money, StoreError> {
        self.check_available()?;
        self.rows
            .get(&account)
            .map(|row| row.balance)
            .ok_or(StoreError::NotFound { account })
    }

    async fn create(&self, account: AccountId) -> Result<(), StoreError> {
        self.check_available()?;
        self.rows
            .entry(account)
            .or_insert_with(|| AccountBalance::new(account));
        Ok(())
    }

    async fn batch_update_balances(
        &self,
        balances: &HashMap<AccountId, Money>,
    ) -> Result<(), StoreError> {
        self.check_available()?;

        for (&account, &balance) in balances {
            let mut row = self
                .rows
                .entry(account)
                .or_insert_with(|| AccountBalance::new(account));
            row.balance = balance;
            row.version += 1;
        }

        self.balance_batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(balances.len());
        Ok(())
    }

    async fn append_operations(&self, records: &[OperationRecord]) -> Result<(), StoreError> {
        self.check_available()?;
        if self.operations_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "in-memory operation log marked unavailable".to_string(),
            });
        }
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
        Ok(())
    }

    async fn load_for_update(&self, account: AccountId) -> Result<(Money, LockToken), StoreError> {
        self.check_available()?;
        self.rows
            .get(&account)
            .map(|row| {
                (
                    row.balance,
                    LockToken {
                        version: row.version,
                    },
                )
            })
            .ok_or(StoreError::NotFound { account })
    }

    async fn save(
        &self,
        account: AccountId,
        balance: Money,
        token: LockToken,
    ) -> Result<(), StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.take_injected_conflict() {
            return Err(StoreError::Conflict { account });
        }

        let mut row = self
            .rows
            .get_mut(&account)
            .ok_or(StoreError::NotFound { account })?;
        if row.version != token.version {
            return Err(StoreError::Conflict { account });
        }
        row.balance = balance;
        row.version += 1;
        Ok(())
    }
}
