//! Wallet Cache Library
//! # Overview
//!
//! This library provides a concurrent, in-memory account balance cache with
//! asynchronous write-back to a durable store. Balance mutations are applied
//! atomically in memory and persisted in bounded background batches, so request
//! latency never depends on storage latency.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Money, AccountId, OperationRecord, errors)
//! - [`config`] - Service configuration and defaults
//! - [`store`] - The `DurableStore` boundary and an in-memory implementation
//! - [`core`] - Business logic components:
//!   - [`core::balance_cache`] - Lock-free per-account balances
//!   - [`core::admission`] - Fair concurrency limit for mutations
//!   - [`core::retry`] - Conflict retry for the strict path
//!   - [`core::journal`] / [`core::dirty_set`] - Work awaiting persistence
//!   - [`core::flusher`] - Background write-back
//!   - [`core::service`] - The `submit_operation` / `read_balance` interface
//! - [`io`] - CSV input and output for the replay binary
//! - [`replay`] - Replays an operations file through the service
//! - [`cli`] - CLI arguments parsing
//!
//! # Operations
//!
//! - **Credit**: Add funds to an account, creating it on first reference
//! - **Debit**: Remove funds; rejected with `InsufficientFunds` if the balance does not cover it
//!
//! # Consistency Modes
//!
//! - **Write-back** (default): served from memory, persisted on the next flush tick
//! - **Strict**: every mutation is written durably before it returns

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod replay;
pub mod store;
pub mod types;

pub use config::{ConsistencyMode, WalletConfig};
pub use core::WalletService;
pub use store::{DurableStore, InMemoryStore};
pub use types::{AccountId, Money, OperationKind, OperationRecord, Outcome, WalletError};
