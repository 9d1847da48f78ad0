use thiserror::Error;
use tracing::debug;

use crate::config::{Config, OverflowPolicy};
use crate::error::Error as RunError;
use crate::parse::Scaled;

/// Longest key a slot can hold.
pub const MAX_KEY_LEN: usize = 100;

const PREFIX_LEN: usize = 8;

/// Running count, sum and extrema of one key's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationStats {
    pub count: u64,
    /// Sum of scaled values.
    pub sum: i64,
    pub min: Scaled,
    pub max: Scaled,
}

impl Default for StationStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StationStats {
    /// The identity of [`StationStats::merge`].
    pub const fn new() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: Scaled::MAX,
            max: Scaled::MIN,
        }
    }

    #[inline]
    pub fn update(&mut self, value: Scaled) {
        self.count += 1;
        self.sum += i64::from(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Unscaled mean.
    pub fn mean(&self) -> f64 {
        self.sum as f64 / 10.0 / self.count as f64
    }
}

/// No free slot was left for a new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("table capacity of {capacity} slots exceeded")]
pub struct CapacityExceeded {
    pub capacity: usize,
}

impl From<CapacityExceeded> for RunError {
    fn from(e: CapacityExceeded) -> Self {
        RunError::CapacityExceeded {
            capacity: e.capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("key of {len} bytes exceeds the {} byte limit", MAX_KEY_LEN)]
    KeyTooLong { len: usize },
    #[error(transparent)]
    Capacity(#[from] CapacityExceeded),
}

impl TableError {
    /// Attaches the offending record's byte offset.
    pub fn at(self, offset: u64) -> RunError {
        match self {
            TableError::KeyTooLong { len } => RunError::KeyTooLong {
                offset,
                len,
                max: MAX_KEY_LEN,
            },
            TableError::Capacity(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    hash: u64,
    prefix: u64,
    len: u8,
    bytes: [u8; MAX_KEY_LEN],
    stats: StationStats,
}

impl Entry {
    fn new(key: &[u8], prefix: u64, hash: u64) -> Self {
        let mut bytes = [0; MAX_KEY_LEN];
        bytes[..key.len()].copy_from_slice(key);
        Self {
            hash,
            prefix,
            len: key.len() as u8,
            bytes,
            stats: StationStats::new(),
        }
    }

    fn key(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[inline]
    fn matches(&self, prefix: u64, key: &[u8]) -> bool {
        self.len as usize == key.len()
            && self.prefix == prefix
            && (key.len() <= PREFIX_LEN || self.bytes[PREFIX_LEN..key.len()] == key[PREFIX_LEN..])
    }
}

/// Empty, or holding one key for the life of the table.
type Slot = Option<Entry>;

enum Probe {
    Found(usize),
    Vacant(usize),
    Full,
}

/// Open-addressing table from short byte keys to [`StationStats`].
///
/// Linear probing from `hash(key) & (capacity - 1)`. Keys are copied into
/// their slot and never removed.
pub struct StationTable {
    slots: Box<[Slot]>,
    len: usize,
    overflow: OverflowPolicy,
}

impl StationTable {
    /// `capacity` is rounded up to a power of two.
    pub fn with_capacity(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            slots: empty_slots(capacity.max(2).next_power_of_two()),
            len: 0,
            overflow,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_capacity(config.table_capacity(), config.overflow)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Stats for `key`, inserting an empty entry if it is new. Callers must
    /// update the entry before the table is read.
    #[inline]
    pub(crate) fn get_or_create(&mut self, key: &[u8]) -> Result<&mut StationStats, TableError> {
        if key.len() > MAX_KEY_LEN {
            return Err(TableError::KeyTooLong { len: key.len() });
        }
        Ok(self.locate(key)?)
    }

    /// Folds one value into `key`'s stats.
    #[inline]
    pub fn record(&mut self, key: &[u8], value: Scaled) -> Result<(), TableError> {
        self.get_or_create(key)?.update(value);
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Option<&StationStats> {
        if key.len() > MAX_KEY_LEN {
            return None;
        }
        let prefix = load_prefix(key);
        match self.probe(hash_key(prefix, key), prefix, key) {
            Probe::Found(index) => self.slots[index].as_ref().map(|entry| &entry.stats),
            Probe::Vacant(_) | Probe::Full => None,
        }
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &StationStats)> {
        self.slots
            .iter()
            .flatten()
            .map(|entry| (entry.key(), &entry.stats))
    }

    /// `get_or_create` for keys already known to fit a slot.
    pub(crate) fn locate(&mut self, key: &[u8]) -> Result<&mut StationStats, CapacityExceeded> {
        debug_assert!(key.len() <= MAX_KEY_LEN);
        let prefix = load_prefix(key);
        let hash = hash_key(prefix, key);

        let index = match (self.probe(hash, prefix, key), self.overflow) {
            (Probe::Found(index), _) => index,
            (Probe::Vacant(index), OverflowPolicy::Fail) => index,
            (Probe::Vacant(index), OverflowPolicy::Grow) if self.len < self.max_load() => index,
            (Probe::Vacant(_) | Probe::Full, OverflowPolicy::Grow) => {
                self.grow();
                self.first_vacant(hash)
            }
            (Probe::Full, OverflowPolicy::Fail) => {
                return Err(CapacityExceeded {
                    capacity: self.capacity(),
                });
            }
        };

        if self.slots[index].is_none() {
            self.len += 1;
        }
        let entry = self.slots[index].get_or_insert_with(|| Entry::new(key, prefix, hash));
        Ok(&mut entry.stats)
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    fn max_load(&self) -> usize {
        self.capacity() - self.capacity() / 8
    }

    /// Visits at most `capacity` slots, so a full table cannot spin.
    #[inline]
    fn probe(&self, hash: u64, prefix: u64, key: &[u8]) -> Probe {
        let mask = self.mask();
        let mut index = hash as usize & mask;
        for _ in 0..self.slots.len() {
            match &self.slots[index] {
                None => return Probe::Vacant(index),
                Some(entry) if entry.matches(prefix, key) => return Probe::Found(index),
                Some(_) => index = (index + 1) & mask,
            }
        }
        Probe::Full
    }

    fn first_vacant(&self, hash: u64) -> usize {
        let mask = self.mask();
        let mut index = hash as usize & mask;
        while self.slots[index].is_some() {
            index = (index + 1) & mask;
        }
        index
    }

    #[cold]
    fn grow(&mut self) {
        let capacity = self.capacity() * 2;
        let old = std::mem::replace(&mut self.slots, empty_slots(capacity));
        for entry in old.into_vec().into_iter().flatten() {
            let index = self.first_vacant(entry.hash);
            self.slots[index] = Some(entry);
        }
        debug!(capacity, keys = self.len, "grew table");
    }
}

fn empty_slots(capacity: usize) -> Box<[Slot]> {
    (0..capacity).map(|_| None).collect()
}

/// Little-endian load of up to the first 8 bytes, zero padded.
#[inline]
fn load_prefix(key: &[u8]) -> u64 {
    let mut buf = [0u8; PREFIX_LEN];
    let len = key.len().min(PREFIX_LEN);
    buf[..len].copy_from_slice(&key[..len]);
    u64::from_le_bytes(buf)
}

#[inline]
fn hash_key(prefix: u64, key: &[u8]) -> u64 {
    let mut h = prefix;
    if key.len() > PREFIX_LEN {
        h ^= load_prefix(&key[PREFIX_LEN..]) << 1;
    }
    h ^= key.len() as u64;
    h = h.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h ^ (h >> 33)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    use super::*;

    fn keys(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("station-{i}").into_bytes()).collect()
    }

    #[test]
    fn stats_track_count_sum_and_extrema() {
        let mut stats = StationStats::new();
        for value in [100, -55, 200] {
            stats.update(value);
        }
        assert_eq!(
            stats,
            StationStats {
                count: 3,
                sum: 245,
                min: -55,
                max: 200
            }
        );
    }

    #[test]
    fn lookups_return_own_stats_in_any_insertion_order() {
        let keys = keys(500);
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(7));

        let mut table = StationTable::with_capacity(2048, OverflowPolicy::Fail);
        for &i in &order {
            table.record(&keys[i], i as Scaled).unwrap();
            table.record(&keys[i], -(i as Scaled)).unwrap();
        }

        assert_eq!(table.len(), keys.len());
        for (i, key) in keys.iter().enumerate() {
            let stats = table.get(key).unwrap();
            assert_eq!(stats.count, 2, "key {i}");
            assert_eq!(stats.sum, 0, "key {i}");
            assert_eq!(stats.max, i as Scaled, "key {i}");
            assert_eq!(stats.min, -(i as Scaled), "key {i}");
        }
        assert!(table.get(b"never-inserted").is_none());
    }

    #[test]
    fn shared_prefix_keys_stay_distinct() {
        let mut table = StationTable::with_capacity(16, OverflowPolicy::Fail);
        table.record(b"Abcdefgh-one", 10).unwrap();
        table.record(b"Abcdefgh-two", 20).unwrap();
        table.record(b"Abcdefgh", 30).unwrap();
        table.record(b"Abcdefgh-one", 40).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(b"Abcdefgh-one").unwrap().count, 2);
        assert_eq!(table.get(b"Abcdefgh-two").unwrap().sum, 20);
        assert_eq!(table.get(b"Abcdefgh").unwrap().sum, 30);
    }

    #[test]
    fn short_keys_differing_only_in_length_stay_distinct() {
        let mut table = StationTable::with_capacity(16, OverflowPolicy::Fail);
        table.record(b"a", 1).unwrap();
        table.record(b"a\0", 2).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(b"a").unwrap().sum, 1);
        assert_eq!(table.get(b"a\0").unwrap().sum, 2);
    }

    #[test]
    fn full_table_reports_capacity_instead_of_looping() {
        let mut table = StationTable::with_capacity(4, OverflowPolicy::Fail);
        for key in keys(4) {
            table.record(&key, 1).unwrap();
        }
        assert_eq!(
            table.record(b"one-too-many", 1),
            Err(TableError::Capacity(CapacityExceeded { capacity: 4 }))
        );
        // Existing keys are still reachable in a full table.
        table.record(b"station-0", 1).unwrap();
        assert_eq!(table.get(b"station-0").unwrap().count, 2);
    }

    #[test]
    fn growing_table_keeps_every_entry() {
        let keys = keys(1000);
        let mut table = StationTable::with_capacity(16, OverflowPolicy::Grow);
        for (i, key) in keys.iter().enumerate() {
            table.record(key, (i % 999) as Scaled).unwrap();
        }
        assert_eq!(table.len(), 1000);
        assert!(table.capacity() >= 1024);
        assert!(table.len() <= table.capacity() - table.capacity() / 8);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(key).unwrap().sum, (i % 999) as i64);
        }
    }

    #[test]
    fn oversized_keys_are_rejected() {
        let mut table = StationTable::with_capacity(16, OverflowPolicy::Grow);
        let long = vec![b'k'; MAX_KEY_LEN + 1];
        assert_eq!(
            table.record(&long, 1),
            Err(TableError::KeyTooLong {
                len: MAX_KEY_LEN + 1
            })
        );
        let longest = vec![b'k'; MAX_KEY_LEN];
        table.record(&longest, 1).unwrap();
        assert_eq!(table.iter().next().unwrap().0, &longest[..]);
    }
}
