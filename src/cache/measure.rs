//! Measured cache
//!
//! Proxy over another [`BackingCache`] that counts every call, used to
//! check how many page round-trips an operation costs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::address::PageAddress;
use crate::error::Result;

use super::BackingCache;

/// Snapshot of the counters kept by a [`MeasuredCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub gets: u64,
    pub sets: u64,
    pub removes: u64,
    pub contains: u64,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    sets: AtomicU64,
    removes: AtomicU64,
    contains: AtomicU64,
}

/// Counts calls made to the wrapped cache; clones share counters
#[derive(Debug, Clone)]
pub struct MeasuredCache<C> {
    inner: C,
    counters: Arc<Counters>,
}

impl<C: BackingCache> MeasuredCache<C> {
    /// Wrap `inner` so calls to it can be measured
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current counter values
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            gets: self.counters.gets.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            removes: self.counters.removes.load(Ordering::Relaxed),
            contains: self.counters.contains.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters
    pub fn reset(&self) {
        self.counters.gets.store(0, Ordering::Relaxed);
        self.counters.sets.store(0, Ordering::Relaxed);
        self.counters.removes.store(0, Ordering::Relaxed);
        self.counters.contains.store(0, Ordering::Relaxed);
    }

    /// The wrapped cache
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: BackingCache> BackingCache for MeasuredCache<C> {
    fn get(&self, address: &PageAddress) -> Result<Option<Bytes>> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        self.inner.get(address)
    }

    fn set(&self, address: &PageAddress, value: Bytes) -> Result<()> {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.inner.set(address, value)
    }

    fn remove(&self, address: &PageAddress) -> Result<bool> {
        self.counters.removes.fetch_add(1, Ordering::Relaxed);
        self.inner.remove(address)
    }

    fn set_if_absent(&self, address: &PageAddress, value: Bytes) -> Result<bool> {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.inner.set_if_absent(address, value)
    }

    fn contains(&self, address: &PageAddress) -> Result<bool> {
        self.counters.contains.fetch_add(1, Ordering::Relaxed);
        self.inner.contains(address)
    }
}
