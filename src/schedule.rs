use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ScanStrategy;
use crate::scan::{TERMINATOR, scan_for_byte};

/// A `[start, end)` range of the input owned by exactly one worker.
///
/// `start` is 0 or one past a terminator; `end` is one past a terminator or
/// the end of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
}

/// Hands out fixed-size chunks of `data` through a shared cursor.
///
/// Every chunk but the first skips past the first terminator at or after its
/// raw start, and every chunk runs on to one past the first terminator at or
/// after its raw end. Neighbouring chunks therefore meet at the same record
/// boundary.
pub struct ChunkScheduler<'a> {
    data: &'a [u8],
    chunk_size: usize,
    count: usize,
    cursor: AtomicUsize,
    scan: ScanStrategy,
}

impl<'a> ChunkScheduler<'a> {
    pub fn new(data: &'a [u8], chunk_size: usize, scan: ScanStrategy) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            data,
            chunk_size,
            count: data.len().div_ceil(chunk_size),
            cursor: AtomicUsize::new(0),
            scan,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of chunks in the input.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Claims the next unprocessed chunk index.
    #[inline]
    pub fn claim(&self) -> Option<usize> {
        // Only uniqueness of the claimed index matters; chunk contents are
        // read-only.
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        (index < self.count).then_some(index)
    }

    pub fn next_chunk(&self) -> Option<Chunk> {
        self.claim().map(|index| self.bounds(index))
    }

    /// Record-aligned bounds of chunk `index`.
    pub fn bounds(&self, index: usize) -> Chunk {
        let raw_start = index.saturating_mul(self.chunk_size).min(self.data.len());
        let raw_end = raw_start.saturating_add(self.chunk_size).min(self.data.len());
        let start = if index == 0 {
            0
        } else {
            self.past_terminator(raw_start)
        };
        Chunk {
            start,
            end: self.past_terminator(raw_end),
        }
    }

    /// One past the first terminator at or after `from`, or the input length.
    fn past_terminator(&self, from: usize) -> usize {
        let rest = &self.data[from..];
        scan_for_byte(self.scan, rest, TERMINATOR).map_or(self.data.len(), |i| from + i + 1)
    }
}
