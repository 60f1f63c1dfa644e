//! Cache manager for persisting API responses
//!
//! Provides a `ResponseCache` that stores serializable data as JSON envelopes with
//! expiry timestamps, supporting graceful degradation when the API is unavailable.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::storage::{KeyValueStore, StoreError};

/// Prefix separating cache entries from other keys in the same store
pub const CACHE_PREFIX: &str = "cache_";

/// Wrapper struct for cached data stored in the key-value store
///
/// The envelope itself marks the key as present, so a `null` payload is a
/// legitimate cached value rather than a miss.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// The cached data
    data: T,
    /// When the data was cached
    cached_at: DateTime<Utc>,
    /// When the cache entry expires
    expires_at: DateTime<Utc>,
}

/// A cached payload together with its timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData<T> {
    /// The cached data
    pub data: T,
    /// When the data was originally cached
    pub cached_at: DateTime<Utc>,
    /// When the entry stopped being fresh
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// Entry exists and has not expired
    Fresh(T),
    /// Entry existed but had expired; it has been removed from the store
    Stale(CachedData<T>),
    /// No usable entry
    Miss,
}

impl<T> CacheLookup<T> {
    /// Returns the payload only for a fresh hit
    pub fn fresh(self) -> Option<T> {
        match self {
            CacheLookup::Fresh(data) => Some(data),
            _ => None,
        }
    }
}

/// Errors that can occur when writing a cache entry
#[derive(Debug, Error)]
pub enum CacheWriteError {
    /// The payload could not be serialized
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The store refused the write
    #[error("Failed to persist cache entry: {0}")]
    Store(#[from] StoreError),

    /// The TTL does not fit in a timestamp
    #[error("Cache TTL of {0:?} is out of range")]
    TtlOutOfRange(Duration),
}

/// Reads and writes cached API payloads
///
/// Entries are stored as JSON under `cache_<key>`, next to non-cache keys such
/// as the auth token. Expired entries are removed on read. Write failures are
/// logged and swallowed by [`ResponseCache::save`] because caching must never
/// break the request that produced the data.
#[derive(Clone)]
pub struct ResponseCache {
    /// Backing store, shared with the token accessor
    store: Arc<dyn KeyValueStore>,
    /// Time source for expiry checks
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Creates a cache over `store` using wall-clock time
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Creates a cache over `store` with a custom time source
    ///
    /// Useful for testing expiry without sleeping.
    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns the namespaced store key for a cache key
    pub fn storage_key(key: &str) -> String {
        format!("{}{}", CACHE_PREFIX, key)
    }

    /// Writes data to the cache, reporting failures
    ///
    /// # Arguments
    /// * `key` - Cache key, usually the request URL
    /// * `data` - The data to cache (must implement Serialize)
    /// * `ttl` - How long the cache entry should be considered fresh
    pub fn try_save<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        ttl: Duration,
    ) -> Result<(), CacheWriteError> {
        let ttl_chrono =
            chrono::Duration::from_std(ttl).map_err(|_| CacheWriteError::TtlOutOfRange(ttl))?;

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl_chrono)
            .ok_or(CacheWriteError::TtlOutOfRange(ttl))?;
        let entry = CacheEntry {
            data,
            cached_at: now,
            expires_at,
        };

        let json = serde_json::to_string(&entry)?;
        self.store.set(&Self::storage_key(key), &json)?;
        debug!(key, ttl_ms = ttl.as_millis() as u64, "cached response");
        Ok(())
    }

    /// Writes data to the cache, best effort
    ///
    /// Failures (store quota, I/O, serialization) are logged and never returned.
    pub fn save<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) {
        if let Err(e) = self.try_save(key, data, ttl) {
            warn!(key, error = %e, "failed to write cache entry");
        }
    }

    /// Reads an entry and classifies it as fresh, stale or missing
    ///
    /// A stale entry is removed from the store before being returned, so it can
    /// only ever be used as a fallback by the caller that read it. Entries that
    /// cannot be decoded as `T` are removed and reported as a miss.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        let storage_key = Self::storage_key(key);

        let raw = match self.store.get(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheLookup::Miss,
            Err(e) => {
                warn!(key, error = %e, "failed to read cache entry");
                return CacheLookup::Miss;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key, error = %e, "discarding undecodable cache entry");
                self.discard(&storage_key);
                return CacheLookup::Miss;
            }
        };

        if self.clock.now() < entry.expires_at {
            return CacheLookup::Fresh(entry.data);
        }

        debug!(key, expired_at = %entry.expires_at, "cache entry expired");
        self.discard(&storage_key);
        CacheLookup::Stale(CachedData {
            data: entry.data,
            cached_at: entry.cached_at,
            expires_at: entry.expires_at,
        })
    }

    /// Reads data from the cache
    ///
    /// Returns `Some` only while the entry is fresh. An expired entry is removed
    /// and `None` is returned.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lookup(key).fresh()
    }

    /// Removes a single cache entry
    pub fn remove(&self, key: &str) {
        self.discard(&Self::storage_key(key));
    }

    /// Removes every cache entry, leaving non-cache keys untouched
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list cache entries");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(CACHE_PREFIX)) {
            match self.store.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "failed to remove cache entry"),
            }
        }
        removed
    }

    fn discard(&self, storage_key: &str) {
        if let Err(e) = self.store.remove(storage_key) {
            warn!(key = storage_key, error = %e, "failed to remove cache entry");
        }
    }
}
