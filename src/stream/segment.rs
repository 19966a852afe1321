//! Segment arithmetic
//!
//! Maps logical stream offsets onto (segment index, offset within segment).

use std::ops::RangeInclusive;

/// Index of the segment holding `offset`
pub fn segment_index(offset: u64, chunk_size: u32) -> u64 {
    offset / chunk_size as u64
}

/// Offset of `offset` inside its segment, always in `[0, chunk_size)`
pub fn position_in_segment(offset: u64, chunk_size: u32) -> usize {
    (offset - segment_index(offset, chunk_size) * chunk_size as u64) as usize
}

/// Segments touched by `count > 0` bytes starting at `offset`
pub fn segment_range(offset: u64, count: u64, chunk_size: u32) -> RangeInclusive<u64> {
    debug_assert!(count > 0);
    segment_index(offset, chunk_size)..=segment_index(offset + count - 1, chunk_size)
}

/// Number of segments needed to hold `length` bytes
pub fn segments_for_length(length: u64, chunk_size: u32) -> u64 {
    length.div_ceil(chunk_size as u64)
}
