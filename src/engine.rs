use std::panic;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{Config, MalformedPolicy};
use crate::error::{Error, Result};
use crate::mapper::MappedFile;
use crate::merge::merge_all;
use crate::parse::parse_record;
use crate::scan::Lines;
use crate::schedule::{Chunk, ChunkScheduler};
use crate::table::StationTable;

/// Skipped records logged individually per worker; the rest are only counted.
const LOGGED_SKIPS: u64 = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Records folded into the table.
    pub records: u64,
    /// Records dropped under [`MalformedPolicy::Skip`].
    pub malformed: u64,
    pub chunks: usize,
    pub workers: usize,
}

impl RunStats {
    fn absorb(&mut self, other: &RunStats) {
        self.records += other.records;
        self.malformed += other.malformed;
        self.chunks += other.chunks;
    }
}

/// Merged result of one run.
pub struct Aggregate {
    pub table: StationTable,
    pub stats: RunStats,
}

pub struct Engine {
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Aggregates every record of `data` on the configured worker pool.
    pub fn run(&self, data: &[u8]) -> Result<Aggregate> {
        let scheduler = ChunkScheduler::new(data, self.config.chunk_size(), self.config.scan);
        let workers = self.config.workers.get().min(scheduler.count()).max(1);
        let stop = AtomicBool::new(false);

        let start = Instant::now();
        let outcomes: Vec<Result<Worker<'_>>> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let config = &self.config;
                    let scheduler = &scheduler;
                    let stop = &stop;
                    // The table is allocated and first touched by its own thread.
                    s.spawn(move || Worker::new(id, config).run(scheduler, stop))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|e| panic::resume_unwind(e)))
                .collect()
        });
        info!(
            "Aggregation took {:?} over {} chunks on {workers} workers",
            start.elapsed(),
            scheduler.count()
        );

        let mut stats = RunStats {
            workers,
            ..RunStats::default()
        };
        let mut tables = Vec::with_capacity(workers);
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(worker) => {
                    stats.absorb(&worker.stats);
                    tables.push(worker.table);
                }
                Err(e) => errors.push(e),
            }
        }
        // Capacity errors first, then the earliest malformed record.
        if let Some(e) = errors.into_iter().min_by_key(Error::offset) {
            return Err(e);
        }

        let start = Instant::now();
        let table = merge_all(tables)?.unwrap_or_else(|| StationTable::from_config(&self.config));
        info!("Merging took {:?}, {} distinct keys", start.elapsed(), table.len());
        if stats.malformed > 0 {
            warn!("skipped {} malformed records", stats.malformed);
        }

        Ok(Aggregate { table, stats })
    }
}

/// Maps `path` and aggregates it. The mapping is released before returning.
pub fn aggregate_file(path: impl AsRef<Path>, config: Config) -> Result<Aggregate> {
    let engine = Engine::new(config)?;
    let input = MappedFile::open(path, engine.config().huge_pages)?;
    engine.run(input.bytes())
}

/// One thread's exclusively owned table and counters.
struct Worker<'c> {
    id: usize,
    config: &'c Config,
    table: StationTable,
    stats: RunStats,
}

impl<'c> Worker<'c> {
    fn new(id: usize, config: &'c Config) -> Self {
        Self {
            id,
            config,
            table: StationTable::from_config(config),
            stats: RunStats::default(),
        }
    }

    fn run(mut self, scheduler: &ChunkScheduler<'_>, stop: &AtomicBool) -> Result<Self> {
        while !stop.load(Ordering::Relaxed) {
            let Some(chunk) = scheduler.next_chunk() else {
                break;
            };
            if let Err(e) = self.process_chunk(scheduler.data(), chunk) {
                stop.store(true, Ordering::Relaxed);
                return Err(e);
            }
        }
        debug!(
            worker = self.id,
            chunks = self.stats.chunks,
            records = self.stats.records,
            malformed = self.stats.malformed,
            keys = self.table.len(),
            "worker finished"
        );
        Ok(self)
    }

    fn process_chunk(&mut self, data: &[u8], chunk: Chunk) -> Result<()> {
        let mut lines = Lines::new(&data[chunk.start..chunk.end], self.config.scan);
        for (offset, record) in &mut lines {
            self.process_record(record, (chunk.start + offset) as u64)?;
        }
        // Only the chunk reaching the end of an unterminated input has a tail.
        let tail = lines.remainder();
        if !tail.is_empty() {
            self.process_record(tail, (chunk.start + lines.position()) as u64)?;
        }
        self.stats.chunks += 1;
        Ok(())
    }

    #[inline]
    fn process_record(&mut self, record: &[u8], offset: u64) -> Result<()> {
        let outcome = match parse_record(record, offset) {
            Ok((key, value)) => self.table.record(key, value).map_err(|e| e.at(offset)),
            Err(violation) => Err(violation.into()),
        };
        match outcome {
            Ok(()) => {
                self.stats.records += 1;
                Ok(())
            }
            Err(e) if e.is_record_error() && self.config.on_malformed == MalformedPolicy::Skip => {
                self.skip(&e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[cold]
    fn skip(&mut self, e: &Error) {
        self.stats.malformed += 1;
        if self.stats.malformed <= LOGGED_SKIPS {
            warn!(worker = self.id, "skipping {e}");
        }
    }
}
