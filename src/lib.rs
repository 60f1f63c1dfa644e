//! EstateDesk API client library
//!
//! A cached REST client for the real-estate document and process management API:
//! bearer-token injection, per-attempt timeouts, retries, and a TTL response cache
//! with optional stale fallback when the network is unavailable.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod storage;
pub mod transport;

pub use client::{CachedApiClient, ClientConfig, Fetched, RequestOptions, ResponseSource};
pub use config::{ApiConfig, CacheTier};
pub use error::ApiError;
