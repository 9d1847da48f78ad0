#![warn(clippy::pedantic)]
use anyhow::{Context, Result, bail};
use clap::Parser;
use fxhash::FxHashSet;
use humansize::{BINARY, format_size};
use indicatif::ProgressBar;
use itertools::Itertools;
use station_agg::generate::{Station, builtin_stations, seeded_pool, write_rows_parallel};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of records to create
    #[arg(
        default_value_t = 1_000_000_000,
        help = "Positive integer number of records to create"
    )]
    num_records: u64,

    /// CSV of weather stations with a `station_name,mean_temp` header
    #[arg(short, long, help = "Path to the input weather stations file")]
    stations: Option<PathBuf>,

    /// Output file for measurements
    #[arg(
        short,
        long,
        default_value = "measurements.txt",
        help = "Path to the output measurements file"
    )]
    output_file: PathBuf,

    /// Seed for reproducible output; generator thread `i` uses `seed + i`
    #[arg(long)]
    seed: Option<u64>,

    /// Generator threads (defaults to available parallelism)
    #[arg(short = 't', long)]
    threads: Option<NonZeroUsize>,
}

fn load_stations(input_file: &Path) -> Result<Vec<Station>> {
    let file = File::open(input_file).with_context(|| {
        format!(
            "Failed to open weather stations file: {}",
            input_file.display()
        )
    })?;
    let reader = BufReader::new(file);

    let mut seen = FxHashSet::default();
    let mut stations = Vec::new();
    for (number, line) in reader.lines().enumerate().skip(1) {
        let line = line.context("Failed to read weather stations file")?;
        let Some((name, mean)) = line.split(',').map(str::trim).collect_tuple() else {
            continue;
        };
        let mean: f64 = mean
            .parse()
            .with_context(|| format!("Invalid mean temperature on line {}", number + 1))?;
        if seen.insert(name.to_string()) {
            stations.push(Station::new(name, mean));
        }
    }
    if stations.is_empty() {
        bail!("No weather stations in {}", input_file.display());
    }
    Ok(stations)
}

#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn estimate_file_size(stations: &[Station], num_rows_to_create: u64) -> String {
    let total_name_bytes: usize = stations.iter().map(|s| s.name.len()).sum();
    let avg_name_bytes = total_name_bytes as f64 / stations.len() as f64;
    let avg_temp_bytes = 4.400_200_100_050_025;
    let avg_line_length = avg_name_bytes + avg_temp_bytes + 2.0;
    let estimated_size = num_rows_to_create as f64 * avg_line_length;

    format_size(estimated_size as u64, BINARY)
}

fn build_test_data(
    stations: &[Station],
    num_rows_to_create: u64,
    output_file: &Path,
    seed: Option<u64>,
    threads: NonZeroUsize,
) -> Result<()> {
    let start_time = Instant::now();
    let mut pool = seeded_pool(stations, seed, threads.get()).context("Invalid station mean")?;

    info!("Building test data on {threads} threads...");

    let file = File::create(output_file).with_context(|| {
        format!(
            "Failed to create measurements file: {}",
            output_file.display()
        )
    })?;
    let mut writer = BufWriter::new(file);

    let pb = ProgressBar::new(num_rows_to_create);
    write_rows_parallel(&mut pool, &mut writer, num_rows_to_create, |written| {
        pb.set_position(written);
    })
    .context("Failed to write to measurements file")?;

    writer.flush().context("Failed to flush writer")?;
    pb.finish_with_message("Test data generation complete");

    let elapsed_time = start_time.elapsed();
    let file_size = std::fs::metadata(output_file)?.len();
    let human_file_size = format_size(file_size, BINARY);

    info!(
        "Test data successfully written to {}",
        output_file.display()
    );
    info!("Actual file size: {human_file_size}");
    info!("Elapsed time: {elapsed_time:?}");

    Ok(())
}

fn main() -> Result<()> {
    station_agg::init_logging();
    let args = Args::parse();

    let stations = match &args.stations {
        Some(path) => load_stations(path)?,
        None => builtin_stations(),
    };
    let estimated_file_size = estimate_file_size(&stations, args.num_records);
    info!("Estimated file size is: {estimated_file_size}");

    let threads = args
        .threads
        .unwrap_or_else(|| std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN));
    build_test_data(&stations, args.num_records, &args.output_file, args.seed, threads)?;
    info!("Test data build complete.");

    Ok(())
}
