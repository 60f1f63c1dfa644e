//! API configuration resolved from the environment
//!
//! Every setting is read once at startup from environment-style variables.
//! Per-domain endpoints fall back to `${API_BASE_URL}/<path>` when unset, and
//! empty values count as unset.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::client::ClientConfig;

/// Base URL used when `API_BASE_URL` is not set
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// Default TTL of the short cache tier (5 minutes)
pub const DEFAULT_TTL_SHORT_MS: u64 = 5 * 60 * 1000;
/// Default TTL of the medium cache tier (30 minutes)
pub const DEFAULT_TTL_MEDIUM_MS: u64 = 30 * 60 * 1000;
/// Default TTL of the long cache tier (24 hours)
pub const DEFAULT_TTL_LONG_MS: u64 = 24 * 60 * 60 * 1000;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Errors that can occur when resolving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric variable did not parse
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    /// A URL variable did not parse
    #[error("{var} is not a valid URL: '{value}'")]
    InvalidUrl { var: &'static str, value: String },

    /// A duration that must be positive was zero
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Cache lifetime tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CacheTier {
    Short,
    Medium,
    Long,
}

/// Millisecond TTLs for each cache tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            short: Duration::from_millis(DEFAULT_TTL_SHORT_MS),
            medium: Duration::from_millis(DEFAULT_TTL_MEDIUM_MS),
            long: Duration::from_millis(DEFAULT_TTL_LONG_MS),
        }
    }
}

/// Absolute URLs of the API's resource collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth: String,
    pub profile: String,
    pub clients: String,
    pub units: String,
    pub services: String,
    pub compliance: String,
    pub documents: String,
    pub processes: String,
}

impl Endpoints {
    /// Endpoints derived entirely from `base_url`
    pub fn under(base_url: &str) -> Self {
        let at = |path: &str| format!("{}/{}", base_url, path);
        Self {
            auth: at("auth/login"),
            profile: at("auth/profile"),
            clients: at("clients"),
            units: at("units"),
            services: at("services"),
            compliance: at("compliance"),
            documents: at("documents"),
            processes: at("processes"),
        }
    }

    /// Looks up an endpoint by resource name (e.g. `"clients"`)
    pub fn get(&self, resource: &str) -> Option<&str> {
        let url = match resource {
            "auth" => &self.auth,
            "profile" => &self.profile,
            "clients" => &self.clients,
            "units" => &self.units,
            "services" => &self.services,
            "compliance" => &self.compliance,
            "documents" => &self.documents,
            "processes" => &self.processes,
            _ => return None,
        };
        Some(url.as_str())
    }
}

/// Resolved API configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Origin for relative request paths, without trailing slash
    pub base_url: String,
    pub endpoints: Endpoints,
    pub cache_ttl: CacheTtls,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Prefix prepended to every request URL, for CORS proxies
    pub cors_proxy: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoints: Endpoints::under(DEFAULT_BASE_URL),
            cache_ttl: CacheTtls::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            cors_proxy: None,
        }
    }
}

impl ApiConfig {
    /// Resolves configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves configuration from an arbitrary variable lookup
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, or `None` if unset
    ///
    /// # Returns
    /// * `Ok(ApiConfig)` with defaults filled in for unset variables
    /// * `Err(ConfigError)` if a variable is set to an invalid value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = match var("API_BASE_URL") {
            Some(url) => parse_url("API_BASE_URL", url)?,
            None => DEFAULT_BASE_URL.to_string(),
        };
        let base_url = base_url.trim_end_matches('/').to_string();

        let defaults = Endpoints::under(&base_url);
        let endpoint = |name: &'static str, default: String| -> Result<String, ConfigError> {
            match var(name) {
                Some(url) => parse_url(name, url),
                None => Ok(default),
            }
        };
        let endpoints = Endpoints {
            auth: endpoint("API_AUTH_URL", defaults.auth)?,
            profile: endpoint("API_PROFILE_URL", defaults.profile)?,
            clients: endpoint("API_CLIENTS_URL", defaults.clients)?,
            units: endpoint("API_UNITS_URL", defaults.units)?,
            services: endpoint("API_SERVICES_URL", defaults.services)?,
            compliance: endpoint("API_COMPLIANCE_URL", defaults.compliance)?,
            documents: endpoint("API_DOCUMENTS_URL", defaults.documents)?,
            processes: endpoint("API_PROCESSES_URL", defaults.processes)?,
        };

        let millis = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            Ok(Duration::from_millis(parse_number(name, var(name), default)?))
        };

        Ok(Self {
            base_url,
            endpoints,
            cache_ttl: CacheTtls {
                short: millis("CACHE_TTL_SHORT_MS", DEFAULT_TTL_SHORT_MS)?,
                medium: millis("CACHE_TTL_MEDIUM_MS", DEFAULT_TTL_MEDIUM_MS)?,
                long: millis("CACHE_TTL_LONG_MS", DEFAULT_TTL_LONG_MS)?,
            },
            max_retries: parse_number("API_MAX_RETRIES", var("API_MAX_RETRIES"), DEFAULT_MAX_RETRIES)?,
            timeout: nonzero("API_TIMEOUT_MS", millis("API_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?)?,
            retry_delay: millis("API_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?,
            cors_proxy: var("API_CORS_PROXY"),
        })
    }

    /// TTL of a cache tier
    pub fn ttl(&self, tier: CacheTier) -> Duration {
        match tier {
            CacheTier::Short => self.cache_ttl.short,
            CacheTier::Medium => self.cache_ttl.medium,
            CacheTier::Long => self.cache_ttl.long,
        }
    }

    /// Builds the client configuration, wiring the CORS proxy as a URL hook
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.base_url)
            .with_max_retries(self.max_retries)
            .with_timeout(self.timeout)
            .with_retry_delay(self.retry_delay);

        if let Some(proxy) = self.cors_proxy.clone() {
            config = config.with_url_transform(Arc::new(move |url: &str| format!("{}{}", proxy, url)));
        }
        config
    }
}

fn parse_url(var: &'static str, value: String) -> Result<String, ConfigError> {
    match Url::parse(&value) {
        Ok(_) => Ok(value),
        Err(_) => Err(ConfigError::InvalidUrl { var, value }),
    }
}

fn nonzero(var: &'static str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::Zero { var });
    }
    Ok(value)
}

fn parse_number<N: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: N,
) -> Result<N, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidNumber { var, value: v }),
        None => Ok(default),
    }
}
