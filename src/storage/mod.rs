//! Persistent key-value storage
//!
//! The response cache and the bearer token both live in a `KeyValueStore`, the
//! same way a browser app keeps them side by side in local storage. Keys are
//! plain strings; the cache namespaces its own keys so they never collide with
//! the token or other app data.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document is not valid JSON
    #[error("Storage document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The write would exceed the store's capacity
    #[error("Storage quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: usize, available: usize },
}

/// Synchronous string key-value store
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists every key currently stored
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
