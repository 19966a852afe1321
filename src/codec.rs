//! Record codec
//!
//! Encoding for the structured pages (stream headers, index headers, index
//! nodes). Segments are raw bytes and never go through this module.
//!
//! ## Page Format
//! ```text
//! ┌──────────┬─────────────┬──────────────────────────┐
//! │ Tag (4)  │ Version (1) │  bincode-encoded body    │
//! └──────────┴─────────────┴──────────────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::address::PageAddress;
use crate::cache::BackingCache;
use crate::error::{PageKvError, Result};

/// Current record format version
pub const FORMAT_VERSION: u8 = 1;

/// Tag (4) + Version (1)
pub const RECORD_HEADER_SIZE: usize = 5;

/// A structured page type
pub trait Record: Serialize + DeserializeOwned {
    /// Identifies the page type; checked on decode
    const TAG: [u8; 4];
}

/// Encode a record into a page payload
pub fn encode<T: Record>(record: &T) -> Result<Bytes> {
    let body = bincode::serialize(record)?;

    let mut page = BytesMut::with_capacity(RECORD_HEADER_SIZE + body.len());
    page.put_slice(&T::TAG);
    page.put_u8(FORMAT_VERSION);
    page.put_slice(&body);

    Ok(page.freeze())
}

/// Decode a page payload, verifying its tag and version
pub fn decode<T: Record>(page: &[u8]) -> Result<T> {
    if page.len() < RECORD_HEADER_SIZE {
        return Err(PageKvError::Corruption(format!(
            "Record too short: expected at least {} bytes, got {}",
            RECORD_HEADER_SIZE,
            page.len()
        )));
    }

    if page[0..4] != T::TAG {
        return Err(PageKvError::Corruption(format!(
            "Unexpected record tag: expected {:?}, got {:?}",
            String::from_utf8_lossy(&T::TAG),
            String::from_utf8_lossy(&page[0..4])
        )));
    }

    if page[4] != FORMAT_VERSION {
        return Err(PageKvError::Corruption(format!(
            "Unsupported record version: {}",
            page[4]
        )));
    }

    Ok(bincode::deserialize(&page[RECORD_HEADER_SIZE..])?)
}

/// Fetch and decode a record; `Ok(None)` if the address has no entry
pub fn load<C, T>(cache: &C, address: &PageAddress) -> Result<Option<T>>
where
    C: BackingCache + ?Sized,
    T: Record,
{
    match cache.get(address)? {
        Some(page) => decode(&page).map(Some),
        None => Ok(None),
    }
}

/// Encode and store a record, overwriting whatever is there
pub fn store<C, T>(cache: &C, address: &PageAddress, record: &T) -> Result<()>
where
    C: BackingCache + ?Sized,
    T: Record,
{
    cache.set(address, encode(record)?)
}
