//! azmon-cache: a generic TTL cache shared across concurrent probes.
//!
//! Each entry stores a value and an absolute expiry instant. Expiry is
//! checked on read; a stale entry is removed by the lookup that finds it.
//! There is no background sweep.
//!
//! # Concurrency model
//!
//! The cache is internally synchronized with a `std::sync::Mutex` around the
//! backing map, so a single instance can be shared behind an `Arc` by every
//! in-flight request. The lock is never held across an `.await`; values are
//! cloned out, so `T` is typically an `Arc<_>`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Upper bound applied to TTLs so `Instant + ttl` cannot overflow.
/// Roughly a century, i.e. "forever" for a process.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// A cached value with its absolute expiry.
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe key → value store with per-entry TTL.
pub struct ExpiringCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> ExpiringCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        // A panic while holding the lock cannot leave the map half-updated:
        // every critical section is a single insert/remove.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look up `key`. Returns `None` on miss or expiry; an expired entry is
    /// removed.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                tracing::debug!(%key, "cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                tracing::debug!(%key, "cache miss (expired)");
                None
            }
            None => {
                tracing::debug!(%key, "cache miss");
                None
            }
        }
    }

    /// Insert or replace `key`, expiring `ttl` from now. TTLs beyond
    /// [`MAX_TTL`] are clamped, so `Duration::MAX` means "never expires".
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let expires_at = Instant::now() + ttl.min(MAX_TTL);
        self.lock().insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Clone> Default for ExpiringCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
