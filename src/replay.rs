//! Replay of an operations file through the wallet service
//!
//! Drives the binary: reads operation requests from CSV, submits them to a
//! [`WalletService`] backed by an [`InMemoryStore`], shuts the service down and
//! writes the resulting durable balances as CSV.
//!
//! # Architecture
//!
//! ```text
//! Replay
//!     ├── ReplayConfig (wallet config, worker threads)
//!     ├── OperationReader (CSV → OperationRequest)
//!     ├── partition by account
//!     └── WalletService (one tokio task per account)
//!         └── InMemoryStore
//! ```
//!
//! # Ordering
//!
//! Requests are partitioned by account. Each account's requests are submitted
//! sequentially, in file order, from their own task; different accounts run
//! concurrently. The final balances are therefore deterministic even though
//! the service itself is exercised concurrently.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use log::{error, info, warn};

use crate::config::WalletConfig;
use crate::core::WalletService;
use crate::io::{write_balances_csv, OperationReader};
use crate::store::InMemoryStore;
use crate::types::{AccountId, OperationRequest, Outcome, WalletError};

/// Settings for one replay run
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub wallet: WalletConfig,
    /// Tokio worker threads
    pub workers: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            wallet: WalletConfig::default(),
            workers: num_cpus::get(),
        }
    }
}

/// Counts reported after a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Rows that could not be parsed
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Replay {
    config: ReplayConfig,
}

impl Replay {
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    /// Replay `input_path` and write the final balances to `output`
    ///
    /// # Returns
    ///
    /// * `Ok(ReplaySummary)` once every row has been handled and the balances written
    /// * `Err(WalletError)` if the file cannot be read, the final flush fails
    ///   or the output cannot be written
    ///
    /// Malformed rows and rejected operations are logged and counted; they do
    /// not abort the run.
    pub fn run(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, WalletError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.workers.max(1))
            .enable_time()
            .build()?;

        let mut summary = ReplaySummary::default();
        let mut requests = Vec::new();
        for row in OperationReader::new(input_path)? {
            match row {
                Ok(request) => requests.push(request),
                Err(e) => {
                    warn!("Skipping row: {}", e);
                    summary.skipped += 1;
                }
            }
        }
        info!(
            "Replaying {} operations from '{}'",
            requests.len(),
            input_path.display()
        );

        let store = Arc::new(InMemoryStore::new());
        let outcomes = runtime.block_on(async {
            let service = Arc::new(WalletService::new(
                store.clone(),
                self.config.wallet.clone(),
            ));
            service.start();

            let outcomes = submit_partitioned(&service, requests).await;
            service.shutdown().await.map(|()| outcomes)
        })?;

        for outcome in &outcomes {
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }
        info!(
            "Replay finished: {} succeeded, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );

        write_balances_csv(&store.rows(), output)
            .map_err(|message| WalletError::IoError { message })?;
        Ok(summary)
    }
}

/// Group requests by account, keeping file order within each account
pub fn partition_by_account(
    requests: Vec<OperationRequest>,
) -> HashMap<AccountId, Vec<OperationRequest>> {
    let mut partitions: HashMap<AccountId, Vec<OperationRequest>> = HashMap::new();
    for request in requests {
        partitions.entry(request.account).or_default().push(request);
    }
    partitions
}

async fn submit_partitioned(
    service: &Arc<WalletService>,
    requests: Vec<OperationRequest>,
) -> Vec<Outcome> {
    let tasks = partition_by_account(requests)
        .into_values()
        .map(|requests| {
            let service = Arc::clone(service);
            tokio::spawn(async move {
                let mut outcomes = Vec::with_capacity(requests.len());
                for request in requests {
                    outcomes.push(submit(&service, request).await);
                }
                outcomes
            })
        })
        .collect::<Vec<_>>();

    let mut outcomes = Vec::new();
    for task in join_all(tasks).await {
        match task {
            Ok(account_outcomes) => outcomes.extend(account_outcomes),
            Err(e) => error!("Replay task panicked: {:?}", e),
        }
    }
    outcomes
}

async fn submit(service: &WalletService, request: OperationRequest) -> Outcome {
    let OperationRequest {
        account,
        kind,
        amount,
    } = request;
    match service.submit_operation(account, kind, amount).await {
        Ok(outcome) => outcome,
        Err(e) => Outcome::failure(account, kind, amount, e.to_string()),
    }
}
