use crate::config::ScanStrategy;

/// Record terminator.
pub const TERMINATOR: u8 = b'\n';

const LANE: usize = 32;

/// Offset of the first `needle` in `haystack`.
#[inline]
pub fn scan_for_byte(strategy: ScanStrategy, haystack: &[u8], needle: u8) -> Option<usize> {
    match strategy {
        ScanStrategy::Lanes => scan_lanes(haystack, needle),
        ScanStrategy::Scalar => scan_scalar(haystack, needle),
        ScanStrategy::Memchr => memchr::memchr(needle, haystack),
    }
}

#[inline]
pub fn scan_scalar(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

/// Compares 32 bytes at a time into a bit mask and takes its lowest set bit.
#[inline]
pub fn scan_lanes(haystack: &[u8], needle: u8) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        // SAFETY: avx2 support was just checked.
        return unsafe { scan_lanes_avx2(haystack, needle) };
    }
    scan_lanes_portable(haystack, needle)
}

/// Fixed-width loop that compiles down to a vector compare plus move-mask.
#[inline]
pub fn scan_lanes_portable(haystack: &[u8], needle: u8) -> Option<usize> {
    let mut lanes = haystack.chunks_exact(LANE);
    let mut base = 0;
    for lane in &mut lanes {
        let mask = lane_mask(lane, needle);
        if mask != 0 {
            return Some(base + mask.trailing_zeros() as usize);
        }
        base += LANE;
    }
    scan_scalar(lanes.remainder(), needle).map(|i| base + i)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn scan_lanes_avx2(haystack: &[u8], needle: u8) -> Option<usize> {
    use std::arch::x86_64::{
        __m256i, _mm256_cmpeq_epi8, _mm256_loadu_si256, _mm256_movemask_epi8, _mm256_set1_epi8,
    };

    let mut lanes = haystack.chunks_exact(LANE);
    let mut base = 0;
    unsafe {
        let pattern = _mm256_set1_epi8(needle as i8);
        for lane in &mut lanes {
            // Unaligned load of exactly LANE bytes.
            let bytes = _mm256_loadu_si256(lane.as_ptr() as *const __m256i);
            let mask = _mm256_movemask_epi8(_mm256_cmpeq_epi8(bytes, pattern)) as u32;
            if mask != 0 {
                return Some(base + mask.trailing_zeros() as usize);
            }
            base += LANE;
        }
    }
    scan_scalar(lanes.remainder(), needle).map(|i| base + i)
}

#[inline(always)]
fn lane_mask(lane: &[u8], needle: u8) -> u32 {
    let mut mask = 0u32;
    for (i, &b) in lane.iter().enumerate() {
        mask |= ((b == needle) as u32) << i;
    }
    mask
}

/// Terminated records of a byte view, without their terminators.
///
/// Yields `(offset, record)` pairs with offsets relative to the view. Bytes
/// after the last terminator are never yielded; they are available from
/// [`Lines::remainder`] once the iterator is exhausted.
pub struct Lines<'a> {
    bytes: &'a [u8],
    pos: usize,
    strategy: ScanStrategy,
}

impl<'a> Lines<'a> {
    pub fn new(bytes: &'a [u8], strategy: ScanStrategy) -> Self {
        Self {
            bytes,
            pos: 0,
            strategy,
        }
    }

    /// Offset of the first byte not yet consumed.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unconsumed bytes; after exhaustion, the unterminated tail.
    pub fn remainder(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (usize, &'a [u8]);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.bytes[self.pos..];
        let len = scan_for_byte(self.strategy, rest, TERMINATOR)?;
        let start = self.pos;
        self.pos += len + 1;
        Some((start, &rest[..len]))
    }
}
