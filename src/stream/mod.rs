//! Segmented Stream Module
//!
//! Presents an unbounded byte sequence as a seekable, readable, writable
//! stream whose bytes live in fixed-size segments, one backing-cache entry
//! per segment.
//!
//! ## Layout
//! ```text
//! {key}          StreamHeader { length, chunk_size }
//! {key}_0        bytes [0, chunk_size)
//! {key}_1        bytes [chunk_size, 2 * chunk_size)
//! ...
//! ```
//!
//! Segments are always stored full-size; the tail of the last one is zero
//! padding. Segments that were never written are simply absent and read
//! back as zeros.
//!
//! ## Durability
//! There is no transaction across segments. A failure in the middle of a
//! multi-segment write leaves the segments processed before it in the
//! cache, and the header may or may not reflect the new length.

mod header;
mod segment;
mod segment_stream;

pub use header::StreamHeader;
pub use segment::{position_in_segment, segment_index, segment_range, segments_for_length};
pub use segment_stream::{remove_stream, SegmentStream, StreamAccess, StreamOptions};
