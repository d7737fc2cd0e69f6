use crate::strategy::BatchConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for the ledger replay tool
#[derive(Parser, Debug)]
#[command(name = "guincoin-ledger")]
#[command(about = "Replay a CSV journal of Guincoin ledger commands", long_about = None)]
pub struct CliArgs {
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for file order or 'async' for partitioned batches"
    )]
    pub strategy: StrategyType,

    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Worker threads for the async strategy (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    #[arg(
        long = "config",
        value_name = "FILE",
        help = "TOML configuration file; GUINCOIN_* variables override it"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long = "report",
        value_name = "REPORT",
        default_value = "balances",
        help = "Report written to stdout: 'balances' or 'statement'"
    )]
    pub report: ReportKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    /// Posted, pending and total balance per employee
    Balances,
    /// Every transaction per employee, oldest first
    Statement,
}

impl CliArgs {
    /// Batch settings for the async strategy
    ///
    /// Missing values take the defaults; zero values are replaced by them.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }
}
