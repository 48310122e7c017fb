//! Background write-back to the durable store
//!
//! The `Flusher` runs two independent periodic tasks:
//!
//! - **Balance sync** drains up to `balance_batch_size` accounts from the
//!   [`DirtySet`] and writes them in one `batch_update_balances` transaction.
//! - **Operation sync** drains up to `operations_batch_size` records from the
//!   [`OperationJournal`], stopping early once `operations_time_budget` has
//!   elapsed, and appends them in one `append_operations` transaction.
//!
//! # Architecture
//!
//! ```text
//! Flusher
//!     ├── Arc<dyn DurableStore>     (write target)
//!     ├── Arc<BalanceCache>         (authoritative values for drained accounts)
//!     ├── Arc<DirtySet>             (balance sync source)
//!     └── Arc<OperationJournal>     (operation sync source)
//! ```
//!
//! # Scheduling
//!
//! Each task awaits its own tick before starting the next one, so ticks of the
//! same task never overlap. The interval skips missed ticks rather than
//! bursting to catch up.
//!
//! # Failure handling
//!
//! A failed batch is logged and handed back to its source (dirty entries are
//! restored, journal records requeued at the head) to be retried on the next
//! tick. Failures never reach request handlers and never roll back cached
//! balances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{BalanceCache, DirtySet, OperationJournal};
use crate::config::FlushConfig;
use crate::store::DurableStore;
use crate::types::{AccountId, Money, WalletError};

/// Counters describing flush activity since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub balances_flushed: u64,
    pub operations_flushed: u64,
    pub failed_batches: u64,
    /// Failed batches since the last successful one, across both tasks
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
struct FlushCounters {
    balances_flushed: AtomicU64,
    operations_flushed: AtomicU64,
    failed_batches: AtomicU64,
    consecutive_failures: AtomicU32,
}

/// Handle on the running background tasks
#[derive(Debug)]
pub struct FlusherHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl FlusherHandle {
    /// Stop both tasks and wait for any tick in progress to finish
    pub async fn stop(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Flush task panicked: {:?}", e);
            }
        }
    }
}

#[derive(Debug)]
pub struct Flusher {
    store: Arc<dyn DurableStore>,
    cache: Arc<BalanceCache>,
    dirty: Arc<DirtySet>,
    journal: Arc<OperationJournal>,
    config: FlushConfig,
    counters: FlushCounters,
}

impl Flusher {
    pub fn new(
        store: Arc<dyn DurableStore>,
        cache: Arc<BalanceCache>,
        dirty: Arc<DirtySet>,
        journal: Arc<OperationJournal>,
        config: FlushConfig,
    ) -> Self {
        Self {
            store,
            cache,
            dirty,
            journal,
            config,
            counters: FlushCounters::default(),
        }
    }

    /// Spawn the balance and operation sync tasks on the current runtime
    pub fn start(self: &Arc<Self>) -> FlusherHandle {
        let shutdown = CancellationToken::new();

        let balances = {
            let flusher = Arc::clone(self);
            let shutdown = shutdown.clone();
            let period = self.config.balance_interval;
            tokio::spawn(async move {
                run_periodic(period, shutdown, move || {
                    let flusher = Arc::clone(&flusher);
                    async move {
                        let _ = flusher.sync_balances().await;
                    }
                })
                .await
            })
        };

        let operations = {
            let flusher = Arc::clone(self);
            let shutdown = shutdown.clone();
            let period = self.config.operations_interval;
            tokio::spawn(async move {
                run_periodic(period, shutdown, move || {
                    let flusher = Arc::clone(&flusher);
                    async move {
                        let _ = flusher.sync_operations().await;
                    }
                })
                .await
            })
        };

        FlusherHandle {
            shutdown,
            tasks: vec![balances, operations],
        }
    }

    /// One balance sync tick. Returns the number of accounts written.
    pub async fn sync_balances(&self) -> Result<usize, WalletError> {
        let drained = self.dirty.drain(self.config.balance_batch_size);
        if drained.is_empty() {
            return Ok(0);
        }

        // the cache may have moved past the marked value; write the newest one
        let batch: HashMap<AccountId, Money> = drained
            .into_iter()
            .map(|(account, marked)| (account, self.cache.peek(account).unwrap_or(marked)))
            .collect();

        debug!("Syncing {} account balances to the store", batch.len());
        match self.store.batch_update_balances(&batch).await {
            Ok(()) => {
                let written = batch.len();
                self.record_success(&self.counters.balances_flushed, written);
                Ok(written)
            }
            Err(e) => {
                let failures = self.record_failure();
                error!(
                    "Balance sync of {} accounts failed ({} consecutive failures): {}",
                    batch.len(),
                    failures,
                    e
                );
                self.dirty.restore(batch);
                Err(WalletError::durable_persistence(e.to_string()))
            }
        }
    }

    /// One operation sync tick. Returns the number of records appended.
    pub async fn sync_operations(&self) -> Result<usize, WalletError> {
        let batch = self.journal.drain(
            self.config.operations_batch_size,
            self.config.operations_time_budget,
        );
        if batch.is_empty() {
            return Ok(0);
        }

        debug!("Saving {} operations to the store", batch.len());
        match self.store.append_operations(&batch).await {
            Ok(()) => {
                let written = batch.len();
                self.record_success(&self.counters.operations_flushed, written);
                Ok(written)
            }
            Err(e) => {
                let failures = self.record_failure();
                error!(
                    "Operation sync of {} records failed ({} consecutive failures): {}",
                    batch.len(),
                    failures,
                    e
                );
                self.journal.requeue_front(batch);
                Err(WalletError::durable_persistence(e.to_string()))
            }
        }
    }

    /// Final synchronous flush
    ///
    /// Appends every queued operation, then writes every cached balance,
    /// whether dirty or not. Rewriting an already-durable balance is harmless.
    /// A failed operation append does not stop the balance writes; the first
    /// error is returned once both have been attempted.
    pub async fn flush_all(&self) -> Result<(), WalletError> {
        let mut first_error = None;

        loop {
            let batch = self
                .journal
                .drain(self.config.operations_batch_size, Duration::MAX);
            if batch.is_empty() {
                break;
            }
            if let Err(e) = self.store.append_operations(&batch).await {
                self.record_failure();
                error!(
                    "Final append of {} operation records failed: {}",
                    batch.len(),
                    e
                );
                self.journal.requeue_front(batch);
                first_error = Some(WalletError::durable_persistence(e.to_string()));
                break;
            }
            self.record_success(&self.counters.operations_flushed, batch.len());
        }

        let dirty = self.dirty.drain(usize::MAX);
        let snapshot = self.cache.snapshot();
        info!("Flushing {} cached balances", snapshot.len());

        for chunk in snapshot.chunks(self.config.balance_batch_size.max(1)) {
            let batch: HashMap<AccountId, Money> = chunk.iter().copied().collect();
            if let Err(e) = self.store.batch_update_balances(&batch).await {
                self.record_failure();
                error!("Final write of {} balances failed: {}", batch.len(), e);
                self.dirty.restore(dirty);
                return Err(first_error
                    .unwrap_or_else(|| WalletError::durable_persistence(e.to_string())));
            }
            self.record_success(&self.counters.balances_flushed, batch.len());
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> FlushStats {
        FlushStats {
            balances_flushed: self.counters.balances_flushed.load(Ordering::Relaxed),
            operations_flushed: self.counters.operations_flushed.load(Ordering::Relaxed),
            failed_batches: self.counters.failed_batches.load(Ordering::Relaxed),
            consecutive_failures: self.counters.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    fn record_success(&self, counter: &AtomicU64, written: usize) {
        counter.fetch_add(written as u64, Ordering::Relaxed);
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) -> u32 {
        self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            + 1
    }
}

/// Run `tick` every `period` until `shutdown` fires
///
/// A tick in progress is never interrupted; cancellation is observed between ticks.
async fn run_periodic<F, Fut>(period: Duration, shutdown: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => tick().await,
        }
    }
}
