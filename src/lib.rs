//! Single-pass, multi-threaded aggregation of `<key>;<value>` records.
//!
//! The input is memory mapped and split into page-sized chunks that workers
//! claim through a shared cursor. Each worker folds its records into its
//! own open-addressing table; the tables are merged once every worker has
//! joined.

pub mod config;
pub mod engine;
pub mod error;
pub mod generate;
pub mod mapper;
pub mod merge;
pub mod parse;
pub mod report;
pub mod scan;
pub mod schedule;
pub mod table;

pub use config::{Config, MalformedPolicy, OverflowPolicy, ScanStrategy};
pub use engine::{Aggregate, Engine, RunStats, aggregate_file};
pub use error::{Error, GrammarViolation, Result, ViolationKind};
pub use mapper::MappedFile;
pub use table::{StationStats, StationTable};

use tracing_subscriber::EnvFilter;

/// Installs the stderr log subscriber used by the binaries. `RUST_LOG`
/// overrides the default `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
