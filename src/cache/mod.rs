//! Response cache for API payloads
//!
//! This module provides a TTL cache that stores API responses in a
//! `KeyValueStore` under namespaced keys. Entries are checked for expiry on every
//! read and removed lazily once expired. An expired payload can still be handed
//! back as a `CacheLookup::Stale` value so the client can serve it when the
//! network is unavailable.

mod manager;

pub use manager::{CacheLookup, CacheWriteError, CachedData, ResponseCache, CACHE_PREFIX};
