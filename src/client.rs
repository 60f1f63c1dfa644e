//! Cached API client
//!
//! `CachedApiClient` is the single entry point to the remote REST API. Every
//! call goes through the same pipeline:
//!
//! 1. Resolve the URL against the configured base URL (and the optional URL hook)
//! 2. Build JSON headers and attach the bearer token unless `skip_auth` is set
//! 3. Send with a per-attempt timeout, retrying transient failures after a fixed delay
//! 4. Turn non-2xx responses into `ApiError::HttpStatus`, parse JSON bodies
//!
//! GET requests can additionally be cached by URL with a TTL, and can fall back
//! to the last cached payload when the live request fails.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{StoredToken, TokenAccessor};
use crate::cache::{CacheLookup, ResponseCache};
use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_MS};
use crate::error::ApiError;
use crate::storage::KeyValueStore;
use crate::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

/// Rewrites a resolved request URL, e.g. to route through a CORS proxy
pub type UrlTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Settings for a `CachedApiClient`
#[derive(Clone)]
pub struct ClientConfig {
    /// Origin for relative request paths
    pub base_url: String,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Optional hook applied to every resolved URL
    pub url_transform: Option<UrlTransform>,
}

impl ClientConfig {
    /// Creates a config with default retry settings (2 retries, 60 s timeout, 2 s delay)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            url_transform: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_url_transform(mut self, transform: UrlTransform) -> Self {
        self.url_transform = Some(transform);
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .field("retry_delay", &self.retry_delay)
            .field("url_transform", &self.url_transform.is_some())
            .finish()
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers, merged over the JSON defaults
    pub headers: BTreeMap<String, String>,
    /// Do not attach the bearer token (used for login)
    pub skip_auth: bool,
    /// Bypass cache reads and writes entirely
    pub skip_cache: bool,
    /// Serve the last cached payload, even if expired, when the request fails
    pub stale_on_error: bool,
    /// Aborts the request, including any pending retry delay
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, &name.into(), value.into());
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn stale_on_error(mut self) -> Self {
        self.stale_on_error = true;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Where a GET payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh data from the network
    Network,
    /// Fresh cache hit, no network call
    Cache,
    /// The live request failed and an expired cache entry was served instead
    StaleFallback,
}

/// A GET payload together with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub source: ResponseSource,
    /// When the served entry was cached, for stale fallbacks
    pub cached_at: Option<DateTime<Utc>>,
}

/// HTTP client with auth injection, retries, timeouts and a TTL response cache
///
/// Cheap to clone; clones share the transport, cache and token accessor.
#[derive(Clone)]
pub struct CachedApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    tokens: Arc<dyn TokenAccessor>,
}

impl CachedApiClient {
    /// Creates a client from explicit collaborators
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        cache: ResponseCache,
        tokens: Arc<dyn TokenAccessor>,
    ) -> Self {
        Self {
            config,
            transport,
            cache,
            tokens,
        }
    }

    /// Creates a client over reqwest, keeping cache and token in `store`
    pub fn with_store(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(
            config,
            Arc::new(ReqwestTransport::new()),
            ResponseCache::new(store.clone()),
            Arc::new(StoredToken::new(store)),
        )
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token accessor used for the `Authorization` header
    pub fn tokens(&self) -> &dyn TokenAccessor {
        self.tokens.as_ref()
    }

    /// Response cache backing GET requests
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Performs a GET request, optionally cached by URL
    ///
    /// # Arguments
    /// * `url` - Absolute URL, or path relative to the base URL; also the cache key
    /// * `options` - Headers and per-request flags
    /// * `cache_ttl` - Cache the response for this long; `None` or zero disables caching
    ///
    /// # Returns
    /// * `Ok(T)` - The decoded payload, from cache or network
    /// * `Err(ApiError)` - If the request fails and no stale fallback applies
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        cache_ttl: Option<Duration>,
    ) -> Result<T, ApiError> {
        Ok(self.get_with_source(url, options, cache_ttl).await?.data)
    }

    /// Performs a GET request and reports where the payload came from
    ///
    /// # Behavior
    /// - With a TTL and without `skip_cache`, a fresh cache entry is returned
    ///   without touching the network
    /// - An expired entry, or one that does not decode as `T`, is removed and
    ///   the live request is made
    /// - A successful response is cached when a TTL was given
    /// - On failure with `stale_on_error`, the last cached payload is served;
    ///   a cancelled request still ends with `ApiError::Cancelled`
    pub async fn get_with_source<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        cache_ttl: Option<Duration>,
    ) -> Result<Fetched<T>, ApiError> {
        let ttl = cache_ttl.filter(|ttl| !ttl.is_zero() && !options.skip_cache);

        let mut stale = None;
        if ttl.is_some() {
            match self.cache.lookup::<Value>(url) {
                CacheLookup::Fresh(data) => match serde_json::from_value(data) {
                    Ok(data) => {
                        debug!(url, "cache hit");
                        return Ok(Fetched {
                            data,
                            source: ResponseSource::Cache,
                            cached_at: None,
                        });
                    }
                    Err(e) => {
                        debug!(url, error = %e, "discarding cached payload of the wrong shape");
                        self.cache.remove(url);
                    }
                },
                CacheLookup::Stale(entry) => stale = Some(entry),
                CacheLookup::Miss => {}
            }
        }

        match self.request(Method::Get, url, None, options).await {
            Ok(payload) => {
                if let Some(ttl) = ttl {
                    self.cache.save(url, &payload, ttl);
                }
                Ok(Fetched {
                    data: decode(payload)?,
                    source: ResponseSource::Network,
                    cached_at: None,
                })
            }
            Err(err)
                if options.stale_on_error
                    && !options.skip_cache
                    && !matches!(err, ApiError::Cancelled) =>
            {
                let fallback = match stale {
                    Some(entry) => Some(Fetched {
                        data: entry.data,
                        source: ResponseSource::StaleFallback,
                        cached_at: Some(entry.cached_at),
                    }),
                    // Without a TTL the cache was not read up front
                    None => match self.cache.lookup::<Value>(url) {
                        CacheLookup::Fresh(data) => Some(Fetched {
                            data,
                            source: ResponseSource::Cache,
                            cached_at: None,
                        }),
                        CacheLookup::Stale(entry) => Some(Fetched {
                            data: entry.data,
                            source: ResponseSource::StaleFallback,
                            cached_at: Some(entry.cached_at),
                        }),
                        CacheLookup::Miss => None,
                    },
                };

                match fallback {
                    Some(fetched) => {
                        warn!(url, error = %err, source = ?fetched.source, "request failed, serving cached data");
                        Ok(Fetched {
                            data: decode(fetched.data)?,
                            source: fetched.source,
                            cached_at: fetched.cached_at,
                        })
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Performs a POST request with a JSON body; never cached
    pub async fn post<B, T>(&self, url: &str, body: &B, options: &RequestOptions) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_body(Method::Post, url, body, options).await
    }

    /// Performs a PUT request with a JSON body; never cached
    pub async fn put<B, T>(&self, url: &str, body: &B, options: &RequestOptions) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_body(Method::Put, url, body, options).await
    }

    /// Performs a PATCH request with a JSON body; never cached
    pub async fn patch<B, T>(&self, url: &str, body: &B, options: &RequestOptions) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_body(Method::Patch, url, body, options).await
    }

    /// Performs a DELETE request without a body; never cached
    pub async fn delete<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        decode(self.request(Method::Delete, url, None, options).await?)
    }

    /// Writes a payload to the cache under a caller-chosen key, best effort
    pub fn save_to_cache<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) {
        self.cache.save(key, data, ttl);
    }

    /// Reads a fresh payload from the cache; expired entries are removed
    pub fn get_from_cache<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.cache.get(key)
    }

    /// Removes a single cache entry
    pub fn remove_from_cache(&self, key: &str) {
        self.cache.remove(key);
    }

    /// Removes every cache entry; returns how many were removed
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    async fn send_with_body<B, T>(
        &self,
        method: Method,
        url: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body).map_err(ApiError::Serialize)?;
        decode(self.request(method, url, Some(body), options).await?)
    }

    /// Runs the retry loop for one logical request
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        options: &RequestOptions,
    ) -> Result<Value, ApiError> {
        let request = HttpRequest {
            method,
            url: self.resolve_url(url)?,
            headers: self.build_headers(options),
            body: body.filter(|_| method != Method::Get),
        };

        let attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            debug!(%method, url = %request.url, attempt, "sending request");
            match self.attempt(&request, options.cancel.as_ref()).await {
                Ok(payload) => return Ok(payload),
                Err(err) if attempt < attempts && err.is_retryable() => {
                    warn!(
                        %method,
                        url = %request.url,
                        attempt,
                        error = %err,
                        "request failed, retrying"
                    );
                    self.pause(options.cancel.as_ref()).await?;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(%method, url = %request.url, attempt, error = %err, "request failed");
                    return Err(err);
                }
            }
        }
    }

    /// Sends one attempt, racing the timeout and the caller's cancel token
    async fn attempt(
        &self,
        request: &HttpRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, ApiError> {
        let send = tokio::time::timeout(self.config.timeout, self.transport.send(request.clone()));

        let outcome = match cancel {
            Some(token) => {
                if token.is_cancelled() {
                    return Err(ApiError::Cancelled);
                }
                tokio::select! {
                    _ = token.cancelled() => return Err(ApiError::Cancelled),
                    outcome = send => outcome,
                }
            }
            None => send.await,
        };

        match outcome {
            Err(_) => Err(ApiError::Timeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(ApiError::Network(e.to_string())),
            Ok(Ok(response)) => parse_response(response),
        }
    }

    /// Waits out the retry delay unless cancelled first
    async fn pause(&self, cancel: Option<&CancellationToken>) -> Result<(), ApiError> {
        if self.config.retry_delay.is_zero() {
            return Ok(());
        }
        match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(ApiError::Cancelled),
                _ = tokio::time::sleep(self.config.retry_delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(self.config.retry_delay).await;
                Ok(())
            }
        }
    }

    /// Resolves `url` against the base URL and applies the URL hook
    fn resolve_url(&self, url: &str) -> Result<String, ApiError> {
        let invalid = |reason: &str| ApiError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        if url.trim().is_empty() {
            return Err(invalid("empty URL"));
        }

        let resolved = if has_scheme(url) {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        };

        let resolved = match &self.config.url_transform {
            Some(transform) => transform(&resolved),
            None => resolved,
        };

        Url::parse(&resolved).map_err(|e| invalid(&e.to_string()))?;
        Ok(resolved)
    }

    fn build_headers(&self, options: &RequestOptions) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());

        for (name, value) in &options.headers {
            set_header(&mut headers, name, value.clone());
        }

        if !options.skip_auth {
            if let Some(token) = self.tokens.token() {
                set_header(&mut headers, "Authorization", format!("Bearer {}", token));
            }
        }

        headers
    }
}

/// Inserts a header, replacing any existing one with the same name in any case
fn set_header(headers: &mut BTreeMap<String, String>, name: &str, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value);
}

fn has_scheme(url: &str) -> bool {
    url.contains("://") && Url::parse(url).is_ok()
}

/// Validates the status and extracts the JSON payload
///
/// Non-JSON and empty 2xx bodies become `{}`.
fn parse_response(response: HttpResponse) -> Result<Value, ApiError> {
    if !response.is_success() {
        return Err(ApiError::from_status(response.status, &response.body));
    }

    if !response.is_json() || response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    serde_json::from_slice(&response.body).map_err(ApiError::Decode)
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, ApiError> {
    serde_json::from_value(payload).map_err(ApiError::Decode)
}
