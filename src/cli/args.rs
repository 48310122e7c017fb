use crate::config::{AdmissionConfig, ConsistencyMode, FlushConfig, WalletConfig};
use crate::replay::ReplayConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Replay balance operations through the write-back wallet cache
#[derive(Parser, Debug)]
#[command(name = "wallet-cache")]
#[command(about = "Replay balance operations through the write-back wallet cache", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing operation records
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// How mutations reach durable storage
    #[arg(
        long = "mode",
        value_name = "MODE",
        default_value = "write-back",
        help = "Consistency mode: 'write-back' (cache, flush later) or 'strict' (durable per request)"
    )]
    pub mode: ModeArg,

    #[arg(
        long = "gate-capacity",
        value_name = "N",
        help = "Maximum mutations in flight (default: 50)"
    )]
    pub gate_capacity: Option<usize>,

    #[arg(
        long = "gate-timeout-ms",
        value_name = "MS",
        help = "How long a request waits for admission (default: 10000)"
    )]
    pub gate_timeout_ms: Option<u64>,

    #[arg(
        long = "balance-batch",
        value_name = "N",
        help = "Maximum accounts written per balance flush (default: 1000)"
    )]
    pub balance_batch: Option<usize>,

    #[arg(
        long = "operation-batch",
        value_name = "N",
        help = "Maximum records appended per operation flush (default: 500)"
    )]
    pub operation_batch: Option<usize>,

    #[arg(
        long = "flush-interval-ms",
        value_name = "MS",
        help = "Period of both flush tasks (default: 1000)"
    )]
    pub flush_interval_ms: Option<u64>,

    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Runtime worker threads (default: CPU cores)"
    )]
    pub workers: Option<usize>,
}

/// Consistency mode as spelled on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    WriteBack,
    Strict,
}

impl From<ModeArg> for ConsistencyMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::WriteBack => ConsistencyMode::WriteBack,
            ModeArg::Strict => ConsistencyMode::Strict,
        }
    }
}

impl CliArgs {
    /// Build the wallet configuration from CLI arguments
    ///
    /// Unset flags keep their defaults. Zero values fall back to the default
    /// with a warning.
    pub fn to_wallet_config(&self) -> WalletConfig {
        let default = WalletConfig::default();

        let admission = if self.gate_capacity.is_some() || self.gate_timeout_ms.is_some() {
            AdmissionConfig::new(
                self.gate_capacity.unwrap_or(default.admission.capacity),
                self.gate_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(default.admission.timeout),
            )
        } else {
            default.admission
        };

        let flush = if self.balance_batch.is_some()
            || self.operation_batch.is_some()
            || self.flush_interval_ms.is_some()
        {
            FlushConfig::new(
                self.flush_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(default.flush.balance_interval),
                self.balance_batch.unwrap_or(default.flush.balance_batch_size),
                self.operation_batch
                    .unwrap_or(default.flush.operations_batch_size),
            )
        } else {
            default.flush
        };

        WalletConfig {
            mode: self.mode.into(),
            admission,
            retry: default.retry,
            flush,
        }
    }

    /// Build the replay configuration from CLI arguments
    pub fn to_replay_config(&self) -> ReplayConfig {
        let default = ReplayConfig::default();
        let workers = match self.workers {
            Some(0) => {
                log::warn!(
                    "Invalid workers (0), using default ({})",
                    default.workers
                );
                default.workers
            }
            Some(workers) => workers,
            None => default.workers,
        };

        ReplayConfig {
            wallet: self.to_wallet_config(),
            workers,
        }
    }
}
