//! Balance service orchestration
//!
//! This module provides `WalletService`, the upward interface of the crate. It
//! wires the admission gate, the balance cache, the operation journal, the dirty
//! set and the flusher together, and exposes two operations:
//!
//! - [`WalletService::submit_operation`] applies a credit or debit
//! - [`WalletService::read_balance`] returns the current balance
//!
//! # Architecture
//!
//! ```text
//! WalletService
//!     ├── AdmissionGate             (bounds in-flight mutations)
//!     ├── Arc<BalanceCache>         (write-back: authoritative balances)
//!     ├── ConflictRetry             (strict: wraps durable read-lock-write)
//!     ├── Arc<OperationJournal>     (records awaiting persistence)
//!     ├── Arc<DirtySet>             (balances awaiting persistence)
//!     └── Arc<Flusher>              (background write-back)
//! ```
//!
//! # Consistency modes
//!
//! The mode is fixed per service instance.
//!
//! - **Write-back**: mutations are served from memory and become durable on a
//!   later flush tick. A crash loses at most one flush interval of updates.
//! - **Strict**: every mutation reads, locks and writes the durable row before
//!   returning, retrying on optimistic-lock conflicts.
//!
//! In both modes every admitted attempt produces exactly one operation record,
//! persisted asynchronously through the journal.
//!
//! # Lifecycle
//!
//! `new` builds the service; `start` spawns the flush tasks; `shutdown` stops
//! admitting requests, waits for in-flight ones, stops the flush tasks and
//! performs a final flush of everything still in memory.

use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info, warn};

use super::{
    AdmissionGate, BalanceCache, ConflictRetry, DirtySet, FlushStats, Flusher, FlusherHandle,
    OperationJournal,
};
use crate::config::{ConsistencyMode, WalletConfig};
use crate::store::{DurableStore, StoreError};
use crate::types::{AccountId, Money, OperationKind, OperationRecord, Outcome, WalletError};

#[derive(Debug)]
pub struct WalletService {
    mode: ConsistencyMode,
    store: Arc<dyn DurableStore>,
    cache: Arc<BalanceCache>,
    journal: Arc<OperationJournal>,
    dirty: Arc<DirtySet>,
    gate: AdmissionGate,
    retry: ConflictRetry,
    flusher: Arc<Flusher>,

    /// Running flush tasks, present between `start` and `shutdown`
    background: Mutex<Option<FlusherHandle>>,
}

impl WalletService {
    /// Create a new WalletService
    ///
    /// # Arguments
    ///
    /// * `store` - Durable storage for balances and operation records
    /// * `config` - Consistency mode, admission, retry and flush settings
    ///
    /// # Returns
    ///
    /// A service with an empty cache. Background flushing does not run until
    /// [`WalletService::start`] is called.
    pub fn new(store: Arc<dyn DurableStore>, config: WalletConfig) -> Self {
        let cache = Arc::new(BalanceCache::new(Arc::clone(&store)));
        let journal = Arc::new(OperationJournal::new());
        let dirty = Arc::new(DirtySet::new());
        let flusher = Arc::new(Flusher::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&dirty),
            Arc::clone(&journal),
            config.flush,
        ));

        Self {
            mode: config.mode,
            store,
            cache,
            journal,
            dirty,
            gate: AdmissionGate::new(&config.admission),
            retry: ConflictRetry::new(&config.retry),
            flusher,
            background: Mutex::new(None),
        }
    }

    /// Spawn the background flush tasks. Calling it again is a no-op.
    pub fn start(&self) {
        let mut background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if background.is_none() {
            info!("Starting wallet service in {:?} mode", self.mode);
            *background = Some(self.flusher.start());
        }
    }

    /// Apply a credit or debit to an account
    ///
    /// # Arguments
    ///
    /// * `account` - Target account; created with a zero balance on first reference
    /// * `kind` - Credit or debit
    /// * `amount` - Strictly positive amount
    ///
    /// # Returns
    ///
    /// * `Ok(Outcome)` - The operation succeeded; carries the resulting balance
    /// * `Err(WalletError::InvalidAmount)` - Amount was not positive; nothing is journaled
    /// * `Err(WalletError::AmountOutOfRange)` - Amount does not fit a balance; nothing is journaled
    /// * `Err(WalletError::AdmissionTimeout)` - No slot freed up in time; nothing is journaled
    /// * `Err(WalletError::Shutdown)` - The service is shutting down; nothing is journaled
    /// * `Err(WalletError::InsufficientFunds)` - Debit exceeded the balance, which is unchanged
    /// * `Err(WalletError::ConcurrencyConflict)` - Strict mode only, retries exhausted
    /// * `Err(WalletError::DurablePersistence)` - The store failed while loading or writing
    ///
    /// Every error after admission is journaled as a failed operation.
    pub async fn submit_operation(
        &self,
        account: AccountId,
        kind: OperationKind,
        amount: Money,
    ) -> Result<Outcome, WalletError> {
        if !amount.is_positive() {
            warn!(
                "Rejected {} of {} on account {}: amount must be positive",
                kind, amount, account
            );
            return Err(WalletError::InvalidAmount { amount });
        }
        if amount.to_minor_units().is_none() {
            warn!(
                "Rejected {} of {} on account {}: amount outside the balance range",
                kind, amount, account
            );
            return Err(WalletError::AmountOutOfRange { amount });
        }

        let _permit = self.gate.acquire().await?;

        let result = match self.mode {
            ConsistencyMode::WriteBack => self.apply_cached(account, kind, amount).await,
            ConsistencyMode::Strict => {
                self.retry
                    .run(account, move || self.apply_durable(account, kind, amount))
                    .await
            }
        };

        match result {
            Ok(balance) => {
                self.journal
                    .push(OperationRecord::succeeded(account, kind, amount));
                Ok(Outcome::success(account, kind, amount, balance))
            }
            Err(e) => {
                if e.is_business_rule() {
                    warn!("Rejected {} of {} on account {}: {}", kind, amount, account, e);
                } else {
                    error!("Failed {} of {} on account {}: {}", kind, amount, account, e);
                }
                self.journal
                    .push(OperationRecord::failed(account, kind, amount, e.to_string()));
                Err(e)
            }
        }
    }

    /// Current balance of an account
    ///
    /// In write-back mode the balance is served from memory and reflects every
    /// successful mutation, flushed or not; an unknown account is created with
    /// a zero balance. In strict mode it is read from the durable store and an
    /// unknown account is reported as `AccountUnknown`.
    pub async fn read_balance(&self, account: AccountId) -> Result<Money, WalletError> {
        match self.mode {
            ConsistencyMode::WriteBack => self.cache.get_or_load(account).await,
            ConsistencyMode::Strict => Ok(self.store.load(account).await?),
        }
    }

    /// Stop accepting work and make everything durable
    ///
    /// Waits for in-flight requests, stops the flush tasks, then appends every
    /// journaled operation and writes every cached balance.
    pub async fn shutdown(&self) -> Result<(), WalletError> {
        info!("Shutting down wallet service");
        self.gate.close().await;

        let background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = background {
            handle.stop().await;
        }

        self.flusher.flush_all().await?;
        info!(
            "Wallet service stopped, {} cached balances persisted",
            self.cache.len()
        );
        Ok(())
    }

    pub fn flusher(&self) -> &Arc<Flusher> {
        &self.flusher
    }

    pub fn flush_stats(&self) -> FlushStats {
        self.flusher.stats()
    }

    /// Accounts whose cached balance is not durable yet
    pub fn dirty_accounts(&self) -> usize {
        self.dirty.len()
    }

    /// Operation records not yet appended to the store
    pub fn pending_operations(&self) -> usize {
        self.journal.len()
    }

    async fn apply_cached(
        &self,
        account: AccountId,
        kind: OperationKind,
        amount: Money,
    ) -> Result<Money, WalletError> {
        let balance = self.cache.apply(account, kind, amount).await?;
        self.dirty.mark(account, balance);
        Ok(balance)
    }

    /// One durable read-lock-write attempt
    async fn apply_durable(
        &self,
        account: AccountId,
        kind: OperationKind,
        amount: Money,
    ) -> Result<Money, WalletError> {
        let (current, token) = match self.store.load_for_update(account).await {
            Ok(locked) => locked,
            Err(StoreError::NotFound { .. }) => {
                info!("Creating account {}", account);
                self.store.create(account).await?;
                self.store.load_for_update(account).await?
            }
            Err(e) => return Err(e.into()),
        };

        let updated = match kind {
            OperationKind::Credit => current
                .checked_add(amount)
                .filter(|balance| balance.to_minor_units().is_some())
                .ok_or(WalletError::ArithmeticOverflow { account })?,
            OperationKind::Debit => current
                .checked_sub(amount)
                .ok_or_else(|| WalletError::insufficient_funds(account, current, amount))?,
        };

        self.store.save(account, updated, token).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::store::InMemoryStore;
    use crate::types::OperationStatus;
    use rstest::rstest;
    use std::str::FromStr;
    use std::time::Duration;

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn service(mode: ConsistencyMode) -> (Arc<WalletService>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let config = WalletConfig {
            mode,
            ..WalletConfig::default()
        };
        (Arc::new(WalletService::new(store.clone(), config)), store)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_both_apply() {
        let (service, _store) = service(ConsistencyMode::WriteBack);
        let account = AccountId::random();

        let a = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .submit_operation(account, OperationKind::Credit, money("100.00"))
                    .await
            })
        };
        let b = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .submit_operation(account, OperationKind::Credit, money("50.00"))
                    .await
            })
        };
        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());

        assert_eq!(service.read_balance(account).await, Ok(money("150.00")));
    }

    #[tokio::test]
    async fn test_overdraft_is_rejected_and_journaled() {
        let (service, store) = service(ConsistencyMode::WriteBack);
        let account = AccountId::random();
        service
            .submit_operation(account, OperationKind::Credit, money("100.00"))
            .await
            .unwrap();

        let result = service
            .submit_operation(account, OperationKind::Debit, money("150.00"))
            .await;

        assert_eq!(
            result,
            Err(WalletError::insufficient_funds(
                account,
                money("100.00"),
                money("150.00")
            ))
        );
        assert_eq!(service.read_balance(account).await, Ok(money("100.00")));

        service.flusher().sync_operations().await.unwrap();
        let records = store.operations();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, OperationStatus::Failed);
        assert!(records[1]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("Insufficient funds"));
    }

    #[tokio::test]
    async fn test_read_after_credit_sees_unflushed_balance() {
        let (service, store) = service(ConsistencyMode::WriteBack);
        let account = AccountId::random();
        store.insert(account, money("20"));

        let outcome = service
            .submit_operation(account, OperationKind::Credit, money("5.5"))
            .await
            .unwrap();

        assert_eq!(outcome.balance, Some(money("25.5")));
        assert_eq!(service.read_balance(account).await, Ok(money("25.5")));
        assert_eq!(store.row(account).unwrap().balance, money("20"));
        assert_eq!(service.dirty_accounts(), 1);
        assert_eq!(service.pending_operations(), 1);
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected_before_admission() {
        let (service, _store) = service(ConsistencyMode::WriteBack);

        let result = service
            .submit_operation(AccountId::random(), OperationKind::Credit, Money::ZERO)
            .await;

        assert_eq!(result, Err(WalletError::InvalidAmount { amount: Money::ZERO }));
        assert_eq!(service.pending_operations(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_out_of_range_amount_is_rejected_before_admission(
        #[values(ConsistencyMode::WriteBack, ConsistencyMode::Strict)] mode: ConsistencyMode,
    ) {
        let (service, store) = service(mode);
        let account = AccountId::random();
        let amount = money("10000000000000000");

        let result = service
            .submit_operation(account, OperationKind::Credit, amount)
            .await;

        assert_eq!(result, Err(WalletError::AmountOutOfRange { amount }));
        assert_eq!(service.pending_operations(), 0);
        assert!(store.row(account).is_none());
    }

    #[tokio::test]
    async fn test_strict_credit_past_balance_range_overflows() {
        let (service, store) = service(ConsistencyMode::Strict);
        let account = AccountId::random();
        let max = Money::from_minor_units(i64::MAX);
        store.insert(account, max);

        let result = service
            .submit_operation(account, OperationKind::Credit, money("1"))
            .await;

        assert_eq!(result, Err(WalletError::ArithmeticOverflow { account }));
        assert_eq!(store.row(account).unwrap().balance, max);
    }

    #[tokio::test]
    async fn test_store_failure_on_first_reference_is_journaled() {
        let (service, store) = service(ConsistencyMode::WriteBack);
        store.set_unavailable(true);

        let result = service
            .submit_operation(AccountId::random(), OperationKind::Credit, money("1"))
            .await;

        assert!(matches!(result, Err(WalletError::DurablePersistence { .. })));
        assert_eq!(service.pending_operations(), 1);
        assert_eq!(service.dirty_accounts(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_no_lost_updates_under_mixed_load() {
        let (service, _store) = service(ConsistencyMode::WriteBack);
        let account = AccountId::random();
        service
            .submit_operation(account, OperationKind::Credit, money("1000"))
            .await
            .unwrap();

        let mut handles = vec![];
        for i in 0..200 {
            let service = Arc::clone(&service);
            let kind = if i % 2 == 0 {
                OperationKind::Credit
            } else {
                OperationKind::Debit
            };
            handles.push(tokio::spawn(async move {
                service.submit_operation(account, kind, money("3")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(service.read_balance(account).await, Ok(money("1000")));
        assert_eq!(service.pending_operations(), 201);
    }

    #[tokio::test]
    async fn test_shutdown_persists_everything_and_rejects_new_work() {
        let (service, store) = service(ConsistencyMode::WriteBack);
        service.start();
        let accounts: Vec<AccountId> = (0..10).map(|_| AccountId::random()).collect();
        for account in &accounts {
            service
                .submit_operation(*account, OperationKind::Credit, money("12.34"))
                .await
                .unwrap();
        }

        service.shutdown().await.unwrap();

        for account in &accounts {
            assert_eq!(store.row(*account).unwrap().balance, money("12.34"));
        }
        assert_eq!(store.operations().len(), 10);
        assert_eq!(
            service
                .submit_operation(accounts[0], OperationKind::Credit, money("1"))
                .await,
            Err(WalletError::Shutdown)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_mode_retries_conflicts() {
        let (service, store) = service(ConsistencyMode::Strict);
        let account = AccountId::random();
        store.insert(account, money("10"));
        store.inject_conflicts(2);

        let outcome = service
            .submit_operation(account, OperationKind::Debit, money("4"))
            .await
            .unwrap();

        assert_eq!(outcome.balance, Some(money("6")));
        assert_eq!(store.save_calls(), 3);
        assert_eq!(store.row(account).unwrap().balance, money("6"));
        assert_eq!(service.read_balance(account).await, Ok(money("6")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_mode_surfaces_exhausted_conflicts() {
        let (service, store) = service(ConsistencyMode::Strict);
        let account = AccountId::random();
        store.insert(account, money("10"));
        store.inject_conflicts(3);

        let result = service
            .submit_operation(account, OperationKind::Credit, money("1"))
            .await;

        assert_eq!(
            result,
            Err(WalletError::concurrency_conflict(
                account,
                RetryConfig::default().max_attempts
            ))
        );
        assert_eq!(store.row(account).unwrap().balance, money("10"));
        assert_eq!(service.pending_operations(), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_creates_on_deposit_and_rejects_unknown_reads() {
        let (service, store) = service(ConsistencyMode::Strict);
        let account = AccountId::random();

        assert_eq!(
            service.read_balance(account).await,
            Err(WalletError::account_unknown(account))
        );

        service
            .submit_operation(account, OperationKind::Credit, money("7.25"))
            .await
            .unwrap();

        assert_eq!(store.row(account).unwrap().balance, money("7.25"));
        assert_eq!(
            service
                .submit_operation(account, OperationKind::Debit, money("8"))
                .await,
            Err(WalletError::insufficient_funds(
                account,
                money("7.25"),
                money("8")
            ))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_strict_mode_serialises_concurrent_writers() {
        let store = Arc::new(InMemoryStore::new());
        let config = WalletConfig {
            mode: ConsistencyMode::Strict,
            retry: RetryConfig::new(10, Duration::from_millis(1)),
            ..WalletConfig::default()
        };
        let service = Arc::new(WalletService::new(store.clone(), config));
        let account = AccountId::random();
        store.insert(account, Money::ZERO);

        let mut handles = vec![];
        for _ in 0..10 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .submit_operation(account, OperationKind::Credit, money("1"))
                    .await
            }));
        }
        let succeeded = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();

        assert_eq!(
            store.row(account).unwrap().balance,
            Money::from_minor_units(succeeded as i64 * 10_000)
        );
    }
}
