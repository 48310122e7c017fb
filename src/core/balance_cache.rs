//! In-memory authoritative balance store
//!
//! This module provides the `BalanceCache` struct, which maps account ids to
//! atomically-updatable balance cells.
//!
//! # Design
//!
//! Each account gets one `BalanceCell` holding the balance as integer minor
//! units in an `AtomicI64`. Mutations run a compare-and-swap loop: read the
//! current value, compute the candidate, install it only if the cell still
//! holds the value that was read. A lost race recomputes from the latest value.
//! The loop never awaits and never blocks, and it is the single place where the
//! non-negative invariant is enforced: a negative candidate is never installed.
//!
//! The cell map itself is a `DashMap`, so lookups of different accounts do not
//! contend. Cells are created lazily on first reference by loading the durable
//! row (creating it with a zero balance when it does not exist yet).
//!
//! # Thread Safety
//!
//! All operations are safe to call concurrently. Operations on the same account
//! observe a total order equal to the order of successful CAS installs, so no
//! update is ever lost.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::info;

use crate::store::{DurableStore, StoreError};
use crate::types::{AccountId, Money, OperationKind, WalletError};

/// A single account's balance, updated only through [`BalanceCell::apply`]
#[derive(Debug)]
pub struct BalanceCell {
    account: AccountId,
    units: AtomicI64,
}

impl BalanceCell {
    fn new(account: AccountId, balance: Money) -> Result<Self, WalletError> {
        let units = balance
            .to_minor_units()
            .ok_or(WalletError::ArithmeticOverflow { account })?;
        Ok(Self {
            account,
            units: AtomicI64::new(units),
        })
    }

    pub fn balance(&self) -> Money {
        Money::from_minor_units(self.units.load(Ordering::Acquire))
    }

    /// Atomically apply a credit or debit and return the new balance
    ///
    /// A debit larger than the balance fails with `InsufficientFunds` carrying
    /// the balance observed by the losing check, and leaves the cell untouched.
    pub fn apply(&self, kind: OperationKind, amount: Money) -> Result<Money, WalletError> {
        let account = self.account;
        let delta = amount
            .to_minor_units()
            .ok_or(WalletError::AmountOutOfRange { amount })?;

        let mut current = self.units.load(Ordering::Acquire);
        loop {
            let candidate = match kind {
                OperationKind::Credit => current
                    .checked_add(delta)
                    .ok_or(WalletError::ArithmeticOverflow { account })?,
                OperationKind::Debit => {
                    if current < delta {
                        return Err(WalletError::insufficient_funds(
                            account,
                            Money::from_minor_units(current),
                            amount,
                        ));
                    }
                    current - delta
                }
            };

            match self.units.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Money::from_minor_units(candidate)),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Lazily populated map of account balances
#[derive(Debug)]
pub struct BalanceCache {
    cells: DashMap<AccountId, Arc<BalanceCell>>,
    store: Arc<dyn DurableStore>,
}

impl BalanceCache {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            cells: DashMap::new(),
            store,
        }
    }

    /// Current balance, loading it from the durable store on first reference
    ///
    /// An account with no durable row is created with a zero balance.
    pub async fn get_or_load(&self, account: AccountId) -> Result<Money, WalletError> {
        Ok(self.cell(account).await?.balance())
    }

    /// Atomically apply an operation to the account's balance
    ///
    /// Loads the account first if it is not cached yet. Returns the balance
    /// installed by this operation.
    pub async fn apply(
        &self,
        account: AccountId,
        kind: OperationKind,
        amount: Money,
    ) -> Result<Money, WalletError> {
        self.cell(account).await?.apply(kind, amount)
    }

    /// Cached balance, without touching the durable store
    pub fn peek(&self, account: AccountId) -> Option<Money> {
        self.cells.get(&account).map(|cell| cell.balance())
    }

    /// Point-in-time copy of every cached balance
    pub fn snapshot(&self) -> Vec<(AccountId, Money)> {
        self.cells
            .iter()
            .map(|entry| (*entry.key(), entry.value().balance()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    async fn cell(&self, account: AccountId) -> Result<Arc<BalanceCell>, WalletError> {
        let cached = self.cells.get(&account).map(|cell| Arc::clone(cell.value()));
        if let Some(cell) = cached {
            return Ok(cell);
        }

        let balance = self.load_or_create(account).await?;
        let loaded = BalanceCell::new(account, balance)?;

        // Concurrent loaders of the same account race here; the first cell
        // installed wins and may already have been mutated.
        let entry = self
            .cells
            .entry(account)
            .or_insert_with(|| Arc::new(loaded));
        Ok(Arc::clone(entry.value()))
    }

    async fn load_or_create(&self, account: AccountId) -> Result<Money, WalletError> {
        match self.store.load(account).await {
            Ok(balance) => Ok(balance),
            Err(StoreError::NotFound { .. }) => {
                info!("Creating account {}", account);
                self.store.create(account).await?;
                Ok(Money::ZERO)
            }
            Err(e) => Err(WalletError::durable_persistence(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::str::FromStr;

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn cache_with_store() -> (BalanceCache, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (BalanceCache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_first_reference_creates_zero_balance_row() {
        let (cache, store) = cache_with_store();
        let account = AccountId::random();

        let balance = cache.get_or_load(account).await.unwrap();

        assert_eq!(balance, Money::ZERO);
        assert_eq!(store.row(account).unwrap().balance, Money::ZERO);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_durable_balance_is_loaded() {
        let (cache, store) = cache_with_store();
        let account = AccountId::random();
        store.insert(account, money("42.5"));

        assert_eq!(cache.get_or_load(account).await.unwrap(), money("42.5"));
    }

    #[tokio::test]
    async fn test_cached_value_is_authoritative_over_store() {
        let (cache, store) = cache_with_store();
        let account = AccountId::random();
        cache.get_or_load(account).await.unwrap();

        // durable row changes behind the cache's back are not observed
        store.insert(account, money("999"));

        assert_eq!(cache.get_or_load(account).await.unwrap(), Money::ZERO);
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let (cache, _store) = cache_with_store();
        let account = AccountId::random();

        let after_credit = cache
            .apply(account, OperationKind::Credit, money("100"))
            .await
            .unwrap();
        let after_debit = cache
            .apply(account, OperationKind::Debit, money("30.25"))
            .await
            .unwrap();

        assert_eq!(after_credit, money("100"));
        assert_eq!(after_debit, money("69.75"));
        assert_eq!(cache.peek(account), Some(money("69.75")));
    }

    #[tokio::test]
    async fn test_debit_exceeding_balance_is_rejected() {
        let (cache, store) = cache_with_store();
        let account = AccountId::random();
        store.insert(account, money("100"));

        let result = cache
            .apply(account, OperationKind::Debit, money("150"))
            .await;

        assert_eq!(
            result,
            Err(WalletError::insufficient_funds(
                account,
                money("100"),
                money("150")
            ))
        );
        assert_eq!(cache.peek(account), Some(money("100")));
    }

    #[tokio::test]
    async fn test_debit_of_entire_balance_reaches_zero() {
        let (cache, store) = cache_with_store();
        let account = AccountId::random();
        store.insert(account, money("10"));

        let balance = cache
            .apply(account, OperationKind::Debit, money("10"))
            .await
            .unwrap();

        assert_eq!(balance, Money::ZERO);
    }

    #[test]
    fn test_credit_overflow_is_reported() {
        let account = AccountId::random();
        let cell = BalanceCell::new(account, Money::from_minor_units(i64::MAX)).unwrap();

        let result = cell.apply(OperationKind::Credit, Money::from_minor_units(1));

        assert_eq!(result, Err(WalletError::ArithmeticOverflow { account }));
        assert_eq!(cell.balance(), Money::from_minor_units(i64::MAX));
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_on_miss() {
        let (cache, store) = cache_with_store();
        store.set_unavailable(true);

        let result = cache.get_or_load(AccountId::random()).await;

        assert!(matches!(
            result,
            Err(WalletError::DurablePersistence { .. })
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_lists_every_cached_account() {
        let (cache, _store) = cache_with_store();
        let a = AccountId::random();
        let b = AccountId::random();
        cache.apply(a, OperationKind::Credit, money("1")).await.unwrap();
        cache.apply(b, OperationKind::Credit, money("2")).await.unwrap();

        let mut snapshot = cache.snapshot();
        snapshot.sort_by_key(|(account, _)| *account);
        let mut expected = vec![(a, money("1")), (b, money("2"))];
        expected.sort_by_key(|(account, _)| *account);

        assert_eq!(snapshot, expected);
    }

    // Concurrent access tests
    // These run on the multi-threaded runtime so the CAS loop sees real contention.

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_are_not_lost() {
        let (cache, _store) = cache_with_store();
        let cache = Arc::new(cache);
        let account = AccountId::random();
        cache.get_or_load(account).await.unwrap();

        let mut handles = vec![];
        for _ in 0..100 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    cache
                        .apply(account, OperationKind::Credit, money("0.01"))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.peek(account), Some(money("10")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let (cache, store) = cache_with_store();
        let cache = Arc::new(cache);
        let account = AccountId::random();
        store.insert(account, money("50"));

        // 200 debits of 1.00 against a balance of 50.00: exactly 50 may succeed
        let mut handles = vec![];
        for _ in 0..200 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.apply(account, OperationKind::Debit, money("1")).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(balance) => {
                    assert!(!balance.is_negative());
                    succeeded += 1;
                }
                Err(e) => assert!(matches!(e, WalletError::InsufficientFunds { .. })),
            }
        }

        assert_eq!(succeeded, 50);
        assert_eq!(cache.peek(account), Some(Money::ZERO));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_references_install_one_cell() {
        let (cache, store) = cache_with_store();
        let cache = Arc::new(cache);
        let account = AccountId::random();

        let mut handles = vec![];
        for _ in 0..20 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .apply(account, OperationKind::Credit, money("1"))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(account), Some(money("20")));
        assert!(store.row(account).is_some());
    }
}
