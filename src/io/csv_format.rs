//! CSV format handling for operation requests and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to operation requests
//! - Balance output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{AccountBalance, AccountId, Money, OperationKind, OperationRequest};
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns: account, kind, amount
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub account: String,
    pub kind: String,
    pub amount: String,
}

/// Convert a CsvRecord to an OperationRequest
///
/// # Arguments
///
/// * `csv_record` - The deserialized CSV record
///
/// # Returns
///
/// Result containing either:
/// - Ok(OperationRequest) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<OperationRequest, String> {
    let account = AccountId::from_str(&csv_record.account)
        .map_err(|_| format!("Invalid account id: '{}'", csv_record.account))?;

    let kind = OperationKind::from_str(&csv_record.kind)?;

    let amount = Money::from_str(csv_record.amount.trim()).map_err(|e| {
        format!(
            "Invalid amount '{}' for account {}: {}",
            csv_record.amount, account, e
        )
    })?;

    Ok(OperationRequest {
        account,
        kind,
        amount,
    })
}

/// Write durable balances to CSV format
///
/// Writes balances with columns: account, balance. Rows are sorted by account
/// id for deterministic output.
///
/// # Arguments
///
/// * `balances` - Slice of balance rows to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_balances_csv(
    balances: &[AccountBalance],
    output: &mut dyn Write,
) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["account", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = balances.to_vec();
    sorted.sort_by_key(|row| row.account);

    for row in sorted {
        writer
            .write_record(&[row.account.to_string(), row.balance.to_string()])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ACCOUNT_A: &str = "6f1c2a3e-0000-4000-8000-000000000001";
    const ACCOUNT_B: &str = "6f1c2a3e-0000-4000-8000-000000000002";

    fn csv_record(account: &str, kind: &str, amount: &str) -> CsvRecord {
        CsvRecord {
            account: account.to_string(),
            kind: kind.to_string(),
            amount: amount.to_string(),
        }
    }

    fn balance(account: &str, units: i64) -> AccountBalance {
        AccountBalance {
            account: AccountId::from_str(account).unwrap(),
            balance: Money::from_minor_units(units),
            version: 1,
        }
    }

    #[rstest]
    #[case("credit", OperationKind::Credit, "100.0", 1_000_000)]
    #[case("deposit", OperationKind::Credit, "0.0001", 1)]
    #[case("DEBIT", OperationKind::Debit, "  50  ", 500_000)] // case insensitive, trimmed
    #[case("withdraw", OperationKind::Debit, "100.1234", 1_001_234)]
    fn test_convert_csv_record_valid(
        #[case] kind: &str,
        #[case] expected_kind: OperationKind,
        #[case] amount: &str,
        #[case] expected_units: i64,
    ) {
        let record = convert_csv_record(csv_record(ACCOUNT_A, kind, amount)).unwrap();

        assert_eq!(record.account, AccountId::from_str(ACCOUNT_A).unwrap());
        assert_eq!(record.kind, expected_kind);
        assert_eq!(record.amount, Money::from_minor_units(expected_units));
    }

    #[rstest]
    #[case::invalid_account("not-a-uuid", "credit", "1.0", "Invalid account id")]
    #[case::invalid_kind(ACCOUNT_A, "transfer", "1.0", "Invalid operation kind")]
    #[case::invalid_amount(ACCOUNT_A, "credit", "lots", "Invalid amount")]
    #[case::empty_amount(ACCOUNT_A, "credit", "", "Invalid amount")]
    #[case::too_precise(ACCOUNT_A, "credit", "1.00001", "Invalid amount")]
    fn test_convert_csv_record_errors(
        #[case] account: &str,
        #[case] kind: &str,
        #[case] amount: &str,
        #[case] expected_error: &str,
    ) {
        let result = convert_csv_record(csv_record(account, kind, amount));

        assert!(result.unwrap_err().contains(expected_error));
    }

    #[rstest]
    #[case::single_account(
        vec![balance(ACCOUNT_A, 1_000_000)],
        "account,balance\n6f1c2a3e-0000-4000-8000-000000000001,100.0000\n"
    )]
    #[case::sorted_by_account(
        vec![balance(ACCOUNT_B, 5678), balance(ACCOUNT_A, 0)],
        "account,balance\n6f1c2a3e-0000-4000-8000-000000000001,0.0000\n6f1c2a3e-0000-4000-8000-000000000002,0.5678\n"
    )]
    #[case::empty(vec![], "account,balance\n")]
    fn test_write_balances_csv(#[case] balances: Vec<AccountBalance>, #[case] expected: &str) {
        let mut output = Vec::new();

        write_balances_csv(&balances, &mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), expected);
    }
}
