//! Segment stream handle
//!
//! Seek/read/write/set-length/flush over the segments of one stream.

use std::io::{self, Read, Seek, SeekFrom, Write};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::address::PageAddress;
use crate::cache::BackingCache;
use crate::codec;
use crate::config::{Config, DEFAULT_CHUNK_SIZE};
use crate::error::{PageKvError, Result};

use super::segment::{position_in_segment, segment_index, segment_range, segments_for_length};
use super::StreamHeader;

// =============================================================================
// Options
// =============================================================================

/// Capabilities a stream handle is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamAccess {
    pub read: bool,
    pub write: bool,
    pub seek: bool,
}

impl StreamAccess {
    pub const READ_ONLY: StreamAccess = StreamAccess {
        read: true,
        write: false,
        seek: true,
    };

    pub const READ_WRITE: StreamAccess = StreamAccess {
        read: true,
        write: true,
        seek: true,
    };
}

impl Default for StreamAccess {
    fn default() -> Self {
        Self::READ_WRITE
    }
}

/// How to open a stream
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Segment size used if the stream has to be created
    pub chunk_size: u32,
    /// Create the stream if its header is absent
    pub create: bool,
    pub access: StreamAccess,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            create: true,
            access: StreamAccess::READ_WRITE,
        }
    }
}

impl From<&Config> for StreamOptions {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.default_chunk_size,
            ..Self::default()
        }
    }
}

impl StreamOptions {
    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn access(mut self, access: StreamAccess) -> Self {
        self.access = access;
        self
    }

    /// Open an existing stream for reading only
    pub fn read_only(self) -> Self {
        self.create(false).access(StreamAccess::READ_ONLY)
    }
}

// =============================================================================
// Stream
// =============================================================================

/// The segment currently addressed by the stream position
struct LoadedSegment {
    index: u64,
    data: Vec<u8>,
    dirty: bool,
}

/// Seekable byte stream stored as fixed-size segments in a backing cache
///
/// Not safe to share between threads, and two handles open on the same
/// address overwrite each other's pages without detection.
///
/// Written bytes sit in the loaded segment until the stream crosses into
/// another segment, or until [`flush`](Self::flush) or
/// [`close`](Self::close) is called.
pub struct SegmentStream<C: BackingCache> {
    cache: C,
    address: PageAddress,
    header: StreamHeader,
    position: u64,
    current: Option<LoadedSegment>,
    access: StreamAccess,
    closed: bool,
}

impl<C: BackingCache> SegmentStream<C> {
    /// Open the stream stored at `address`
    ///
    /// An existing header always wins over `options.chunk_size`. If there is
    /// no header and `options.create` is false, fails with `NotFound`.
    pub fn open(cache: C, address: PageAddress, options: StreamOptions) -> Result<Self> {
        let header = match codec::load::<_, StreamHeader>(&cache, &address)? {
            Some(header) => {
                if header.chunk_size == 0 {
                    return Err(PageKvError::Corruption(format!(
                        "Stream {} has a zero chunk size",
                        address
                    )));
                }
                if header.chunk_size != options.chunk_size {
                    warn!(
                        stream = %address,
                        stored = header.chunk_size,
                        requested = options.chunk_size,
                        "Chunk size mismatch, using stored value"
                    );
                }
                header
            }
            None if options.create => {
                let header = StreamHeader::new(options.chunk_size)?;
                codec::store(&cache, &address, &header)?;
                debug!(stream = %address, chunk_size = header.chunk_size, "Created stream");
                header
            }
            None => {
                return Err(PageKvError::NotFound(format!("stream {}", address)));
            }
        };

        Ok(Self {
            cache,
            address,
            header,
            position: 0,
            current: None,
            access: options.access,
            closed: false,
        })
    }

    /// Open or create a read-write stream with the default chunk size
    pub fn create(cache: C, address: PageAddress) -> Result<Self> {
        Self::open(cache, address, StreamOptions::default())
    }

    // =========================================================================
    // Stream Operations
    // =========================================================================

    /// Move the position; returns the new absolute offset
    ///
    /// Seeking past the end grows the stream without allocating segments,
    /// which needs write access.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.require(self.access.seek, "seek")?;

        let target: i128 = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.header.length as i128 + delta as i128,
        };

        if target < 0 || target > u64::MAX as i128 {
            return Err(PageKvError::OutOfRange(format!(
                "seek target {} is outside the stream address space",
                target
            )));
        }
        let target = target as u64;

        if target > self.header.length {
            self.require(self.access.write, "seek past the end")?;
            self.persist_length(target)?;
            debug!(stream = %self.address, length = target, "Stream grown by seek");
        }

        let target_segment = segment_index(target, self.header.chunk_size);
        if matches!(&self.current, Some(segment) if segment.index != target_segment) {
            self.flush_segment()?;
            self.current = None;
        }

        self.position = target;
        Ok(target)
    }

    /// Read up to `count` bytes into `buf[offset..]`; returns bytes read
    ///
    /// Returns 0 at or past the end of the stream.
    pub fn read_at(&mut self, buf: &mut [u8], offset: usize, count: usize) -> Result<usize> {
        self.require(self.access.read, "read")?;
        check_bounds(buf.len(), offset, count)?;

        if count == 0 || self.position >= self.header.length {
            return Ok(0);
        }

        let available = self.header.length - self.position;
        let count = (count as u64).min(available) as usize;
        let chunk_size = self.header.chunk_size;

        let mut copied = 0;
        for index in segment_range(self.position, count as u64, chunk_size) {
            let start = position_in_segment(self.position + copied as u64, chunk_size);
            let take = (chunk_size as usize - start).min(count - copied);

            let segment = self.ensure_segment(index, false)?;
            buf[offset + copied..offset + copied + take]
                .copy_from_slice(&segment.data[start..start + take]);
            copied += take;
        }

        self.position += count as u64;
        Ok(count)
    }

    /// Write `buf[offset..offset + count]` at the current position
    pub fn write_at(&mut self, buf: &[u8], offset: usize, count: usize) -> Result<()> {
        self.require(self.access.write, "write")?;
        check_bounds(buf.len(), offset, count)?;

        if count == 0 {
            return Ok(());
        }

        let end = self.position.checked_add(count as u64).ok_or_else(|| {
            PageKvError::OutOfRange("write extends past the stream address space".to_string())
        })?;
        let chunk_size = self.header.chunk_size;

        let mut copied = 0;
        for index in segment_range(self.position, count as u64, chunk_size) {
            let start = position_in_segment(self.position + copied as u64, chunk_size);
            let take = (chunk_size as usize - start).min(count - copied);
            let overwrite = take == chunk_size as usize;

            let segment = self.ensure_segment(index, overwrite)?;
            segment.data[start..start + take]
                .copy_from_slice(&buf[offset + copied..offset + copied + take]);
            segment.dirty = true;
            copied += take;
        }

        if end > self.header.length {
            self.persist_length(end)?;
        }

        self.position = end;
        Ok(())
    }

    /// Truncate or extend the stream to `value` bytes
    ///
    /// Shrinking deletes every segment that starts at or beyond `value` and
    /// zeroes the remainder of the segment containing `value`. Growing only
    /// updates the header.
    pub fn set_length(&mut self, value: u64) -> Result<()> {
        self.require(self.access.write && self.access.seek, "set_length")?;

        let old_length = self.header.length;
        let chunk_size = self.header.chunk_size;

        if value < old_length {
            let first_removed = segments_for_length(value, chunk_size);
            let last = segment_index(old_length - 1, chunk_size);

            if matches!(&self.current, Some(segment) if segment.index >= first_removed) {
                self.current = None;
            }

            for index in first_removed..=last {
                self.cache.remove(&self.address.segment(index))?;
            }

            let tail = position_in_segment(value, chunk_size);
            if tail != 0 {
                let segment = self.ensure_segment(segment_index(value, chunk_size), false)?;
                if segment.data[tail..].iter().any(|&b| b != 0) {
                    segment.data[tail..].fill(0);
                    segment.dirty = true;
                }
            }

            if self.position > value {
                self.position = value;
            }

            debug!(
                stream = %self.address,
                from = old_length,
                to = value,
                removed = (last + 1).saturating_sub(first_removed),
                "Stream truncated"
            );
        }

        self.persist_length(value)
    }

    /// Write the loaded segment (if modified) and the header to the cache
    pub fn flush(&mut self) -> Result<()> {
        self.require(true, "flush")?;
        self.flush_all()
    }

    /// Flush and disable the handle; calling it again is a no-op
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.flush_all();
        self.current = None;
        trace!(stream = %self.address, "Stream closed");
        result
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Logical length in bytes
    pub fn length(&self) -> u64 {
        self.header.length
    }

    /// Current position
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn chunk_size(&self) -> u32 {
        self.header.chunk_size
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn address(&self) -> &PageAddress {
        &self.address
    }

    /// Number of segments the current length spans
    pub fn segment_count(&self) -> u64 {
        self.header.segment_span()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn can_read(&self) -> bool {
        !self.closed && self.access.read
    }

    pub fn can_write(&self) -> bool {
        !self.closed && self.access.write
    }

    pub fn can_seek(&self) -> bool {
        !self.closed && self.access.seek
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn require(&self, allowed: bool, operation: &str) -> Result<()> {
        if self.closed {
            return Err(PageKvError::Capability(format!(
                "{} on closed stream {}",
                operation, self.address
            )));
        }
        if !allowed {
            return Err(PageKvError::Capability(format!(
                "stream {} was not opened for {}",
                self.address, operation
            )));
        }
        Ok(())
    }

    /// Make segment `index` the loaded one, writing back the previous one
    ///
    /// With `overwrite` the caller replaces the whole segment, so its old
    /// contents are not fetched.
    fn ensure_segment(&mut self, index: u64, overwrite: bool) -> Result<&mut LoadedSegment> {
        let segment = match self.current.take() {
            Some(segment) if segment.index == index => segment,
            previous => {
                if let Some(segment) = previous {
                    if let Err(e) = self.write_back(&segment) {
                        self.current = Some(segment);
                        return Err(e);
                    }
                }
                self.load_segment(index, overwrite)?
            }
        };

        Ok(self.current.insert(segment))
    }

    fn load_segment(&self, index: u64, overwrite: bool) -> Result<LoadedSegment> {
        let chunk_size = self.header.chunk_size as usize;

        let data = if overwrite {
            vec![0; chunk_size]
        } else {
            match self.cache.get(&self.address.segment(index))? {
                Some(bytes) => {
                    let mut data = bytes.to_vec();
                    if data.len() != chunk_size {
                        warn!(
                            stream = %self.address,
                            segment = index,
                            found = data.len(),
                            expected = chunk_size,
                            "Segment has unexpected size"
                        );
                        data.resize(chunk_size, 0);
                    }
                    data
                }
                None => vec![0; chunk_size],
            }
        };

        trace!(stream = %self.address, segment = index, "Segment loaded");
        Ok(LoadedSegment {
            index,
            data,
            dirty: false,
        })
    }

    fn write_back(&self, segment: &LoadedSegment) -> Result<()> {
        if segment.dirty {
            self.cache.set(
                &self.address.segment(segment.index),
                Bytes::copy_from_slice(&segment.data),
            )?;
            trace!(stream = %self.address, segment = segment.index, "Segment flushed");
        }
        Ok(())
    }

    fn flush_segment(&mut self) -> Result<()> {
        if let Some(segment) = &self.current {
            self.write_back(segment)?;
        }
        if let Some(segment) = self.current.as_mut() {
            segment.dirty = false;
        }
        Ok(())
    }

    fn flush_all(&mut self) -> Result<()> {
        self.flush_segment()?;
        if self.access.write {
            self.persist_header()?;
        }
        Ok(())
    }

    fn persist_header(&self) -> Result<()> {
        codec::store(&self.cache, &self.address, &self.header)
    }

    /// Store a header with the new length, then adopt it
    fn persist_length(&mut self, length: u64) -> Result<()> {
        let header = StreamHeader {
            length,
            ..self.header
        };
        codec::store(&self.cache, &self.address, &header)?;
        self.header = header;
        Ok(())
    }
}

impl<C: BackingCache> Drop for SegmentStream<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(stream = %self.address, error = %e, "Failed to close stream on drop");
        }
    }
}

fn check_bounds(buf_len: usize, offset: usize, count: usize) -> Result<()> {
    if offset > buf_len || buf_len - offset < count {
        return Err(PageKvError::InvalidArgument(format!(
            "buffer of {} bytes cannot hold {} bytes at offset {}",
            buf_len, count, offset
        )));
    }
    Ok(())
}

/// Delete a stream's header and every segment its length spans
///
/// Returns false if no stream exists at `address`.
pub fn remove_stream<C: BackingCache>(cache: &C, address: &PageAddress) -> Result<bool> {
    let header = match codec::load::<_, StreamHeader>(cache, address)? {
        Some(header) => header,
        None => return Ok(false),
    };

    for index in 0..header.segment_span() {
        cache.remove(&address.segment(index))?;
    }
    cache.remove(address)?;

    debug!(stream = %address, segments = header.segment_span(), "Stream removed");
    Ok(true)
}

// =============================================================================
// std::io Adapters
// =============================================================================

impl<C: BackingCache> Read for SegmentStream<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len();
        Ok(self.read_at(buf, 0, count)?)
    }
}

impl<C: BackingCache> Write for SegmentStream<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(buf, 0, buf.len())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(SegmentStream::flush(self)?)
    }
}

impl<C: BackingCache> Seek for SegmentStream<C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(SegmentStream::seek(self, pos)?)
    }
}
