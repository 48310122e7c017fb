//! Core balance processing module
//!
//! This module contains the components behind the wallet service:
//! - `balance_cache` - Lock-free per-account balance cells loaded on first reference
//! - `admission` - Process-wide fair concurrency limit for mutations
//! - `retry` - Bounded conflict retry for the strict path
//! - `journal` - Queue of operation records awaiting persistence
//! - `dirty_set` - Accounts whose balance awaits persistence
//! - `flusher` - Background write-back to the durable store
//! - `service` - Orchestration and the upward `submit_operation` / `read_balance` interface

pub mod admission;
pub mod balance_cache;
pub mod dirty_set;
pub mod flusher;
pub mod journal;
pub mod retry;
pub mod service;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use balance_cache::{BalanceCache, BalanceCell};
pub use dirty_set::DirtySet;
pub use flusher::{FlushStats, Flusher, FlusherHandle};
pub use journal::OperationJournal;
pub use retry::ConflictRetry;
pub use service::WalletService;
