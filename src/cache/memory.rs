//! In-memory backing cache
//!
//! HashMap-based cache with RwLock for concurrency. Clones share the same
//! entries, so several handles can be bound to one cache.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::address::PageAddress;
use crate::error::Result;

use super::BackingCache;

/// A backing cache where all entries are kept in memory and never persisted
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<PageAddress, Bytes>>>,
}

impl MemoryCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all namespaces
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sorted keys stored in `namespace` (for tests and debugging)
    pub fn keys_in(&self, namespace: Option<&str>) -> Vec<String> {
        let entries = self.entries.read();
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|address| address.namespace() == namespace)
            .map(|address| address.key().to_string())
            .collect();
        keys.sort();
        keys
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl BackingCache for MemoryCache {
    fn get(&self, address: &PageAddress) -> Result<Option<Bytes>> {
        Ok(self.entries.read().get(address).cloned())
    }

    fn set(&self, address: &PageAddress, value: Bytes) -> Result<()> {
        self.entries.write().insert(address.clone(), value);
        Ok(())
    }

    fn remove(&self, address: &PageAddress) -> Result<bool> {
        Ok(self.entries.write().remove(address).is_some())
    }

    fn set_if_absent(&self, address: &PageAddress, value: Bytes) -> Result<bool> {
        // Check and insert under one write guard
        let mut entries = self.entries.write();
        if entries.contains_key(address) {
            return Ok(false);
        }
        entries.insert(address.clone(), value);
        Ok(true)
    }

    fn contains(&self, address: &PageAddress) -> Result<bool> {
        Ok(self.entries.read().contains_key(address))
    }
}
