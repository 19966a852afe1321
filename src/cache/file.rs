//! File-backed cache
//!
//! Stores each entry as its own file under a root directory, one
//! subdirectory per namespace. Keys are hex-encoded into file names and
//! prefixed with `k` so the empty key still names a file.
//!
//! ## Entry Format
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────────┐
//! │Magic (4) │ CRC (4)  │ Len (4)  │       Payload       │
//! └──────────┴──────────┴──────────┴─────────────────────┘
//! ```
//!
//! Writes land in a temp file first and are renamed into place, so a reader
//! never observes a half-written entry.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::address::PageAddress;
use crate::error::{PageKvError, Result};

use super::BackingCache;

/// Magic bytes identifying a pagekv cache entry
const MAGIC: &[u8; 4] = b"PKFC";

/// Entry header: Magic (4) + CRC (4) + Len (4) = 12 bytes
const ENTRY_HEADER_SIZE: usize = 12;

/// Directory used for entries without a namespace
const DEFAULT_NAMESPACE_DIR: &str = "_default";

/// A backing cache persisted as one file per entry
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open or create a cache rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of this cache
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of entries stored in `namespace`
    pub fn count_in(&self, namespace: Option<&str>) -> Result<usize> {
        let dir = self.namespace_dir(namespace);
        if !dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_none() {
                count += 1;
            }
        }
        Ok(count)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn namespace_dir(&self, namespace: Option<&str>) -> PathBuf {
        match namespace {
            Some(ns) => self.root.join(format!("ns_{}", hex(ns.as_bytes()))),
            None => self.root.join(DEFAULT_NAMESPACE_DIR),
        }
    }

    fn entry_path(&self, address: &PageAddress) -> PathBuf {
        self.namespace_dir(address.namespace())
            .join(format!("k{}", hex(address.key().as_bytes())))
    }

    /// Write `value` to a fresh temp file next to `path`
    fn write_temp(&self, path: &Path, value: &[u8]) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let suffix: u64 = rand::random();
        let temp_path = path.with_extension(format!("{:016x}.tmp", suffix));

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)?;
        file.write_all(&encode_entry(value))?;
        file.sync_all()?;

        Ok(temp_path)
    }
}

impl BackingCache for FileCache {
    fn get(&self, address: &PageAddress) -> Result<Option<Bytes>> {
        let path = self.entry_path(address);

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        decode_entry(&raw)
            .map(Some)
            .map_err(|reason| PageKvError::Corruption(format!("{}: {}", address, reason)))
    }

    fn set(&self, address: &PageAddress, value: Bytes) -> Result<()> {
        let path = self.entry_path(address);
        let temp_path = self.write_temp(&path, &value)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn remove(&self, address: &PageAddress) -> Result<bool> {
        match fs::remove_file(self.entry_path(address)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn set_if_absent(&self, address: &PageAddress, value: Bytes) -> Result<bool> {
        let path = self.entry_path(address);
        let temp_path = self.write_temp(&path, &value)?;

        // Linking fails if the target exists, which makes this atomic
        let linked = fs::hard_link(&temp_path, &path);
        fs::remove_file(&temp_path)?;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, address: &PageAddress) -> Result<bool> {
        Ok(self.entry_path(address).is_file())
    }
}

// =============================================================================
// Entry Encoding
// =============================================================================

fn encode_entry(value: &[u8]) -> Vec<u8> {
    let mut entry = Vec::with_capacity(ENTRY_HEADER_SIZE + value.len());
    entry.extend_from_slice(MAGIC);
    entry.extend_from_slice(&crc32fast::hash(value).to_le_bytes());
    entry.extend_from_slice(&(value.len() as u32).to_le_bytes());
    entry.extend_from_slice(value);
    entry
}

fn decode_entry(raw: &[u8]) -> std::result::Result<Bytes, String> {
    if raw.len() < ENTRY_HEADER_SIZE {
        return Err(format!("truncated entry ({} bytes)", raw.len()));
    }

    if &raw[0..4] != MAGIC {
        return Err(format!("invalid magic {:?}", &raw[0..4]));
    }

    let crc = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
    let len = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]) as usize;

    let payload = &raw[ENTRY_HEADER_SIZE..];
    if payload.len() != len {
        return Err(format!(
            "length mismatch: header says {}, found {}",
            len,
            payload.len()
        ));
    }

    if crc32fast::hash(payload) != crc {
        return Err("checksum mismatch".to_string());
    }

    Ok(Bytes::copy_from_slice(payload))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
