//! Cache Lock
//!
//! Advisory mutual exclusion between handles sharing one backing cache.
//!
//! A lock is an entry at a caller-chosen address. Acquiring it relies on
//! the cache's atomic `set_if_absent`; there is no check-then-set fallback.
//! Releasing removes the entry. A holder that crashes leaves the entry
//! behind, and nothing expires it.
//!
//! Release reads the entry and removes it only if it still holds the
//! guard's token. The read and the remove are two cache calls, not one
//! atomic step, so this is only sound while guards are the only code that
//! removes lock entries. Code that clears a stale lock by hand can race a
//! new holder's entry out from under it.

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::address::PageAddress;
use crate::cache::BackingCache;
use crate::error::Result;

/// Entry point for acquiring locks stored in a backing cache
pub struct CacheLock;

impl CacheLock {
    /// Try to take the lock at `address` once
    ///
    /// Returns `Ok(None)` if another holder has it.
    pub fn try_acquire<C: BackingCache>(
        cache: C,
        address: PageAddress,
    ) -> Result<Option<LockGuard<C>>> {
        let token: u128 = rand::random();
        let value = Bytes::copy_from_slice(&token.to_le_bytes());

        if cache.set_if_absent(&address, value.clone())? {
            debug!(lock = %address, "Lock acquired");
            Ok(Some(LockGuard {
                cache,
                address,
                token: value,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Poll for the lock up to `attempts` times, sleeping `backoff` in between
    pub fn acquire_with_retry<C: BackingCache + Clone>(
        cache: C,
        address: PageAddress,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Option<LockGuard<C>>> {
        for attempt in 0..attempts {
            if let Some(guard) = Self::try_acquire(cache.clone(), address.clone())? {
                return Ok(Some(guard));
            }
            if attempt + 1 < attempts {
                thread::sleep(backoff);
            }
        }
        Ok(None)
    }
}

/// Held lock; released on [`LockGuard::release`] or drop
pub struct LockGuard<C: BackingCache> {
    cache: C,
    address: PageAddress,
    token: Bytes,
    released: bool,
}

impl<C: BackingCache> LockGuard<C> {
    pub fn address(&self) -> &PageAddress {
        &self.address
    }

    /// Release the lock
    ///
    /// The entry is only removed if it still carries this guard's token.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match self.cache.get(&self.address)? {
            Some(current) if current == self.token => {
                self.cache.remove(&self.address)?;
                debug!(lock = %self.address, "Lock released");
            }
            _ => warn!(lock = %self.address, "Lock entry changed while held"),
        }
        Ok(())
    }
}

impl<C: BackingCache> Drop for LockGuard<C> {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!(lock = %self.address, error = %e, "Failed to release lock");
        }
    }
}
