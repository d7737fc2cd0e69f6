//! Guincoin ledger replay CLI
//!
//! Replays a CSV journal of ledger commands and writes a report to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- journal.csv > balances.csv
//! cargo run -- --strategy sync --report statement journal.csv > statement.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 journal.csv
//! cargo run -- --config ledger.toml journal.csv
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the configured level.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (bad configuration, input not readable, report not writable)

use guincoin_ledger::app::Guincoin;
use guincoin_ledger::cli::{self, CliArgs, StrategyType};
use guincoin_ledger::config::Config;
use guincoin_ledger::logging;
use guincoin_ledger::strategy::{self, ReplaySession};
use guincoin_ledger::types::LedgerError;
use std::process;
use std::sync::Arc;

fn main() {
    let args = cli::parse_args();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<(), LedgerError> {
    let config = Config::load(args.config.as_deref())?;
    logging::init(&config.logging)?;

    let strategy = {
        let batch_config = match args.strategy {
            StrategyType::Async => Some(args.to_batch_config()),
            StrategyType::Sync => None,
        };
        strategy::create_strategy(args.strategy, batch_config)
    };

    tracing::info!(input = %args.input_file.display(), strategy = ?args.strategy, "replay started");
    let session = Arc::new(ReplaySession::new(Guincoin::new(config)));
    strategy.process(&args.input_file, &session)?;
    tracing::info!(
        employees = session.app().directory().len(),
        transactions = session.app().store().transaction_count(),
        "replay finished"
    );

    let mut output = std::io::stdout().lock();
    session.write_report(args.report, &mut output)
}
