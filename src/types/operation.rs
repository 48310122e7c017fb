//! Operation-related types
//!
//! This module defines account identifiers, operation kinds, the journaled
//! operation record and the outcome returned to callers of the wallet service.

use super::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account identifier
///
/// Opaque and externally assigned. Accounts are created on first reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn new(id: Uuid) -> Self {
        AccountId(id)
    }

    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        AccountId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        AccountId(id)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(AccountId)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Add funds. Always succeeds unless the amount is out of range.
    Credit,

    /// Remove funds. Requires the current balance to cover the amount.
    Debit,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Credit => "credit",
            OperationKind::Debit => "debit",
        }
    }
}

impl FromStr for OperationKind {
    type Err = String;

    /// Accepts `credit`/`debit` and the `deposit`/`withdraw` aliases, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "credit" | "deposit" => Ok(OperationKind::Credit),
            "debit" | "withdraw" | "withdrawal" => Ok(OperationKind::Debit),
            other => Err(format!("Invalid operation kind: '{}'", other)),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an operation was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Failed,
}

/// A balance mutation waiting to be submitted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationRequest {
    pub account: AccountId,
    pub kind: OperationKind,
    pub amount: Money,
}

/// A journaled balance operation
///
/// Records are immutable and append-only. They are created synchronously with
/// the balance mutation attempt and persisted later by the flusher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub account: AccountId,
    pub kind: OperationKind,
    pub amount: Money,
    pub status: OperationStatus,

    /// Present only for failed operations.
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl OperationRecord {
    pub fn succeeded(account: AccountId, kind: OperationKind, amount: Money) -> Self {
        Self {
            account,
            kind,
            amount,
            status: OperationStatus::Success,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        account: AccountId,
        kind: OperationKind,
        amount: Money,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            account,
            kind,
            amount,
            status: OperationStatus::Failed,
            failure_reason: Some(reason.into()),
            created_at: Utc::now(),
        }
    }
}

/// Result of `submit_operation` handed back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub account: AccountId,
    pub kind: OperationKind,
    pub amount: Money,
    pub status: OperationStatus,

    /// Balance after the operation, for successful operations.
    pub balance: Option<Money>,

    /// Reason the operation was rejected, for failed operations.
    pub failure_reason: Option<String>,
}

impl Outcome {
    pub fn success(account: AccountId, kind: OperationKind, amount: Money, balance: Money) -> Self {
        Self {
            account,
            kind,
            amount,
            status: OperationStatus::Success,
            balance: Some(balance),
            failure_reason: None,
        }
    }

    pub fn failure(
        account: AccountId,
        kind: OperationKind,
        amount: Money,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            account,
            kind,
            amount,
            status: OperationStatus::Failed,
            balance: None,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }
}
