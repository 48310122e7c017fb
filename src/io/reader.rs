//! Streaming CSV reader for operation requests
//!
//! Provides an iterator over operation requests from a CSV file. CSV format
//! concerns are delegated to the csv_format module.
//!
//! ```no_run
//! use wallet_cache::io::OperationReader;
//! use std::path::Path;
//!
//! let reader = OperationReader::new(Path::new("operations.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(request) => println!("Submitting: {:?}", request),
//!         Err(e) => eprintln!("Skipping: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual row errors are yielded as `WalletError::ParseError` with the
//!   line number, so callers can skip the row and keep going

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::{OperationRequest, WalletError};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

#[derive(Debug)]
pub struct OperationReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl OperationReader {
    /// Open a CSV file of operations
    ///
    /// Fields are trimmed and rows with a wrong field count are reported per
    /// row rather than aborting the whole file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    ///
    /// # Returns
    ///
    /// * `Ok(OperationReader)` if the file opened successfully
    /// * `Err(WalletError::IoError)` if it could not be opened
    pub fn new(path: &Path) -> Result<Self, WalletError> {
        let file = File::open(path).map_err(|e| WalletError::IoError {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
        })
    }
}

impl Iterator for OperationReader {
    type Item = Result<OperationRequest, WalletError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();
        let row = deserializer.next()?;
        self.line_num += 1;

        let line = Some(self.line_num);
        Some(match row {
            Ok(csv_record) => convert_csv_record(csv_record)
                .map_err(|message| WalletError::ParseError { line, message }),
            Err(e) => Err(WalletError::ParseError {
                line,
                message: e.to_string(),
            }),
        })
    }
}
