//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `money`: Fixed-point monetary amounts
//! - `operation`: Account ids, operation kinds, journal records and outcomes
//! - `account`: Durable account row
//! - `error`: Error types for the wallet cache

pub mod account;
pub mod error;
pub mod money;
pub mod operation;

pub use account::AccountBalance;
pub use error::WalletError;
pub use money::{Money, ParseMoneyError};
pub use operation::{
    AccountId, OperationKind, OperationRecord, OperationRequest, OperationStatus, Outcome,
};
