//! Stream header record
//!
//! Stored at the stream's own address; source of truth for its length and
//! segment size.

use serde::{Deserialize, Serialize};

use crate::codec::Record;
use crate::error::{PageKvError, Result};

use super::segment::segments_for_length;

/// Length and chunk size of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    /// Logical length in bytes
    pub length: u64,
    /// Bytes per segment; fixed for the stream's lifetime
    pub chunk_size: u32,
}

impl Record for StreamHeader {
    const TAG: [u8; 4] = *b"PKSH";
}

impl StreamHeader {
    /// Header of an empty stream
    pub fn new(chunk_size: u32) -> Result<Self> {
        if chunk_size == 0 {
            return Err(PageKvError::InvalidArgument(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            length: 0,
            chunk_size,
        })
    }

    /// Number of segments the logical length spans
    pub fn segment_span(&self) -> u64 {
        segments_for_length(self.length, self.chunk_size)
    }
}
