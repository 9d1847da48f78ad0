use std::{
    io::{BufWriter, Write},
    num::NonZeroUsize,
    path::PathBuf,
};

use anyhow::Context;
use clap::Parser;
use station_agg::{
    Config, Engine, MalformedPolicy, MappedFile, OverflowPolicy, ScanStrategy, report,
};
use tracing::info;

fn main() -> anyhow::Result<()> {
    station_agg::init_logging();
    let start = std::time::Instant::now();
    let args = Args::parse();
    let engine = Engine::new(args.config())?;
    let input = MappedFile::open(&args.input_file, engine.config().huge_pages)
        .with_context(|| format!("Failed to map {}", args.input_file.display()))?;
    info!("Setup took {:?}", start.elapsed());

    let aggregate = engine
        .run(input.bytes())
        .with_context(|| format!("Failed to aggregate {}", args.input_file.display()))?;
    info!(
        "Read {} records ({} malformed) into {} keys",
        aggregate.stats.records,
        aggregate.stats.malformed,
        aggregate.table.len()
    );

    let handle = std::io::stdout().lock();
    let mut writer = BufWriter::new(handle);
    let start_writing = std::time::Instant::now();
    report::write_report(&mut writer, &aggregate.table)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!("Writing took {:?}", start_writing.elapsed());

    // The mapping outlives the report.
    drop(input);
    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to measurements file
    input_file: PathBuf,

    /// Worker threads (defaults to available parallelism)
    #[arg(short = 't', long)]
    threads: Option<NonZeroUsize>,

    /// OS pages per chunk
    #[arg(long)]
    chunk_pages: Option<usize>,

    /// Expected number of distinct keys, used to size each table
    #[arg(long)]
    expected_keys: Option<usize>,

    /// What to do with a malformed record
    #[arg(long, value_enum, default_value_t = MalformedPolicy::Abort)]
    on_malformed: MalformedPolicy,

    /// What to do when a table runs out of slots
    #[arg(long, value_enum, default_value_t = OverflowPolicy::Grow)]
    overflow: OverflowPolicy,

    /// Record terminator search
    #[arg(long, value_enum, default_value_t = ScanStrategy::Lanes)]
    scan: ScanStrategy,

    /// Skip the huge page hint for the mapping
    #[arg(long)]
    no_huge_pages: bool,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::new()
            .with_on_malformed(self.on_malformed)
            .with_overflow(self.overflow)
            .with_scan(self.scan)
            .with_huge_pages(!self.no_huge_pages);
        if let Some(threads) = self.threads {
            config = config.with_workers(threads);
        }
        if let Some(chunk_pages) = self.chunk_pages {
            config = config.with_chunk_pages(chunk_pages);
        }
        if let Some(expected_keys) = self.expected_keys {
            config = config.with_expected_keys(expected_keys);
        }
        config
    }
}
