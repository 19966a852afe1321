//! Backing Cache Module
//!
//! The only storage primitive the engines rely on: a namespaced key-value
//! map with single-entry get/set/remove/contains.
//!
//! ## Contract
//! - No ordering, range scans or multi-entry transactions
//! - `set` overwrites unconditionally (no versioning, no compare-and-swap)
//! - `set_if_absent` MUST be atomic; it is the only primitive mutual
//!   exclusion may be built on (see [`crate::lock`])
//! - `get_or_create` is not required to be atomic
//!
//! The cache is shared and outlives every stream or index handle bound to
//! it; handles never initialize or tear it down.

mod file;
mod measure;
mod memory;

use std::sync::Arc;

use bytes::Bytes;

use crate::address::PageAddress;
use crate::error::Result;

pub use file::FileCache;
pub use measure::{CacheStats, MeasuredCache};
pub use memory::MemoryCache;

/// A namespaced key-value store used as the page store
pub trait BackingCache {
    /// Fetch the entry stored at `address`
    fn get(&self, address: &PageAddress) -> Result<Option<Bytes>>;

    /// Store `value` at `address`, replacing any previous entry
    fn set(&self, address: &PageAddress, value: Bytes) -> Result<()>;

    /// Delete the entry at `address`; returns whether one existed
    fn remove(&self, address: &PageAddress) -> Result<bool>;

    /// Store `value` only if `address` is empty; returns whether it was stored
    fn set_if_absent(&self, address: &PageAddress, value: Bytes) -> Result<bool>;

    /// Check whether `address` holds an entry
    fn contains(&self, address: &PageAddress) -> Result<bool> {
        Ok(self.get(address)?.is_some())
    }

    /// Fetch the entry at `address`, storing `factory()` first if absent
    ///
    /// Plain get-then-set: two callers racing on an empty address may both
    /// run their factory and the last `set` wins.
    fn get_or_create<F>(&self, address: &PageAddress, factory: F) -> Result<Bytes>
    where
        F: FnOnce() -> Bytes,
        Self: Sized,
    {
        if let Some(value) = self.get(address)? {
            return Ok(value);
        }

        let value = factory();
        self.set(address, value.clone())?;
        Ok(value)
    }
}

impl<T: BackingCache + ?Sized> BackingCache for &T {
    fn get(&self, address: &PageAddress) -> Result<Option<Bytes>> {
        (**self).get(address)
    }

    fn set(&self, address: &PageAddress, value: Bytes) -> Result<()> {
        (**self).set(address, value)
    }

    fn remove(&self, address: &PageAddress) -> Result<bool> {
        (**self).remove(address)
    }

    fn set_if_absent(&self, address: &PageAddress, value: Bytes) -> Result<bool> {
        (**self).set_if_absent(address, value)
    }

    fn contains(&self, address: &PageAddress) -> Result<bool> {
        (**self).contains(address)
    }
}

impl<T: BackingCache + ?Sized> BackingCache for Arc<T> {
    fn get(&self, address: &PageAddress) -> Result<Option<Bytes>> {
        (**self).get(address)
    }

    fn set(&self, address: &PageAddress, value: Bytes) -> Result<()> {
        (**self).set(address, value)
    }

    fn remove(&self, address: &PageAddress) -> Result<bool> {
        (**self).remove(address)
    }

    fn set_if_absent(&self, address: &PageAddress, value: Bytes) -> Result<bool> {
        (**self).set_if_absent(address, value)
    }

    fn contains(&self, address: &PageAddress) -> Result<bool> {
        (**self).contains(address)
    }
}
