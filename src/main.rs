//! Wallet cache replay CLI
//!
//! Replays balance operations from a CSV file through the wallet service and
//! prints the final durable balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > balances.csv
//! cargo run -- --mode strict operations.csv > balances.csv
//! cargo run -- --gate-capacity 8 --balance-batch 200 --flush-interval-ms 250 operations.csv
//! RUST_LOG=debug cargo run -- operations.csv
//! ```
//!
//! Input columns are `account,kind,amount`; output columns are `account,balance`,
//! sorted by account. Logs go to stderr and are controlled by `RUST_LOG`.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (file not found, final flush failed, output not writable)

use log::error;
use std::process;
use wallet_cache::cli;
use wallet_cache::replay::Replay;

fn main() {
    env_logger::init();

    let args = cli::parse_args();
    let replay = Replay::new(args.to_replay_config());

    let mut output = std::io::stdout();
    if let Err(e) = replay.run(&args.input_file, &mut output) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
