use std::num::NonZeroUsize;
use std::thread;

use clap::ValueEnum;

use crate::error::{Error, Result};

const DEFAULT_CHUNK_PAGES: usize = 64;
const DEFAULT_EXPECTED_KEYS: usize = 10_000;
const FALLBACK_PAGE_SIZE: usize = 4096;
const MIN_TABLE_CAPACITY: usize = 16;

/// What a worker does with a record that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MalformedPolicy {
    /// Stop the whole run and report the record.
    #[default]
    Abort,
    /// Count the record, log it and keep going.
    Skip,
}

/// What a table does once it runs out of free slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OverflowPolicy {
    /// Double the table before it gets too full to probe cheaply.
    #[default]
    Grow,
    /// Report `CapacityExceeded` when a new key finds no free slot.
    Fail,
}

/// Implementation behind `scan::scan_for_byte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ScanStrategy {
    /// 32-byte lanes compared to a bit mask, scalar tail.
    #[default]
    Lanes,
    /// One byte at a time.
    Scalar,
    /// The `memchr` crate.
    Memchr,
}

/// Run configuration, built once at startup and passed to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub workers: NonZeroUsize,
    pub page_size: usize,
    pub chunk_pages: usize,
    pub expected_keys: usize,
    pub overflow: OverflowPolicy,
    pub on_malformed: MalformedPolicy,
    pub scan: ScanStrategy,
    pub huge_pages: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            page_size: page_size(),
            chunk_pages: DEFAULT_CHUNK_PAGES,
            expected_keys: DEFAULT_EXPECTED_KEYS,
            overflow: OverflowPolicy::default(),
            on_malformed: MalformedPolicy::default(),
            scan: ScanStrategy::default(),
            huge_pages: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_chunk_pages(mut self, chunk_pages: usize) -> Self {
        self.chunk_pages = chunk_pages;
        self
    }

    pub fn with_expected_keys(mut self, expected_keys: usize) -> Self {
        self.expected_keys = expected_keys;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_on_malformed(mut self, on_malformed: MalformedPolicy) -> Self {
        self.on_malformed = on_malformed;
        self
    }

    pub fn with_scan(mut self, scan: ScanStrategy) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_huge_pages(mut self, huge_pages: bool) -> Self {
        self.huge_pages = huge_pages;
        self
    }

    /// Bytes per chunk handed to a worker.
    pub fn chunk_size(&self) -> usize {
        self.chunk_pages.saturating_mul(self.page_size)
    }

    /// Initial slot count of each worker's table: a power of two with at
    /// least twice as many slots as expected keys.
    pub fn table_capacity(&self) -> usize {
        self.expected_keys
            .saturating_mul(2)
            .max(MIN_TABLE_CAPACITY)
            .checked_next_power_of_two()
            .unwrap_or(1 << (usize::BITS - 1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidConfig("page size must be non-zero".into()));
        }
        if self.chunk_pages == 0 {
            return Err(Error::InvalidConfig("chunk pages must be non-zero".into()));
        }
        if self.expected_keys == 0 {
            return Err(Error::InvalidConfig("expected keys must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size)
        .ok()
        .filter(|&size| size > 0)
        .unwrap_or(FALLBACK_PAGE_SIZE)
}

#[cfg(not(unix))]
fn page_size() -> usize {
    FALLBACK_PAGE_SIZE
}
