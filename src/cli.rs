//! Command-line interface for EstateDesk
//!
//! This module handles parsing of CLI arguments using clap and runs the parsed
//! command against a `CachedApiClient`. URLs may be given as paths relative to
//! `API_BASE_URL`, as absolute URLs, or as `@resource[/rest]` shorthands that
//! expand to the configured endpoint (e.g. `@clients/42`).

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use thiserror::Error;

use crate::client::{CachedApiClient, RequestOptions};
use crate::config::{ApiConfig, CacheTier, Endpoints};
use crate::error::ApiError;

/// Error types for CLI commands
#[derive(Debug, Error)]
pub enum CliError {
    /// A `-H` argument was not `NAME:VALUE`
    #[error("Invalid header: '{0}'. Expected NAME:VALUE")]
    InvalidHeader(String),

    /// The `--data` argument was not valid JSON
    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),

    /// An `@resource` shorthand named no known endpoint
    #[error("Unknown resource: '{0}'. Valid resources: auth, profile, clients, units, services, compliance, documents, processes")]
    UnknownResource(String),

    /// Login succeeded but the response carried no token
    #[error("Login response did not contain a token")]
    MissingToken,

    /// `login` needs either a token or a username and password
    #[error("Provide --token, or both --username and --password")]
    MissingCredentials,

    /// The API call failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// EstateDesk - cached client for the document and process management API
#[derive(Parser, Debug)]
#[command(name = "estatedesk")]
#[command(about = "Query the EstateDesk API with caching and offline fallback")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a resource, optionally caching the response
    Get {
        /// Path, absolute URL, or @resource shorthand
        url: String,
        /// Cache the response using this TTL tier
        #[arg(long, value_enum)]
        ttl: Option<CacheTier>,
        /// Bypass the cache for this request
        #[arg(long)]
        no_cache: bool,
        /// Serve the last cached response if the request fails
        #[arg(long)]
        stale_on_error: bool,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Create a resource
    Post {
        url: String,
        #[command(flatten)]
        body: BodyArgs,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Replace a resource
    Put {
        url: String,
        #[command(flatten)]
        body: BodyArgs,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Partially update a resource
    Patch {
        url: String,
        #[command(flatten)]
        body: BodyArgs,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Delete a resource
    Delete {
        url: String,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Store a bearer token, either directly or by logging in
    Login {
        /// Token to store as-is
        #[arg(long, conflicts_with_all = ["username", "password"])]
        token: Option<String>,
        #[arg(long, requires = "password")]
        username: Option<String>,
        #[arg(long, requires = "username")]
        password: Option<String>,
    },
    /// Forget the stored token and clear the response cache
    Logout,
    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

/// Cache maintenance commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    /// Remove every cached response
    Clear,
}

/// Options shared by all request commands
#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// Extra request header (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,
    /// Do not send the stored bearer token
    #[arg(long)]
    pub no_auth: bool,
}

/// JSON body for write commands
#[derive(Args, Debug, Clone, Default)]
pub struct BodyArgs {
    /// JSON request body (defaults to `{}`)
    #[arg(long, value_name = "JSON")]
    pub data: Option<String>,
}

impl RequestArgs {
    /// Converts the arguments into request options
    pub fn to_options(&self) -> Result<RequestOptions, CliError> {
        let mut options = RequestOptions::new();
        for header in &self.headers {
            let (name, value) = parse_header_arg(header)?;
            options = options.with_header(name, value);
        }
        options.skip_auth = self.no_auth;
        Ok(options)
    }
}

impl BodyArgs {
    /// Parses the body, defaulting to an empty object
    pub fn to_value(&self) -> Result<Value, CliError> {
        match &self.data {
            Some(raw) => serde_json::from_str(raw).map_err(|e| CliError::InvalidBody(e.to_string())),
            None => Ok(json!({})),
        }
    }
}

/// Parses a `NAME:VALUE` header argument.
///
/// # Arguments
/// * `s` - The header string from CLI
///
/// # Returns
/// * `Ok((name, value))` with surrounding whitespace trimmed
/// * `Err(CliError::InvalidHeader)` if there is no colon or the name is empty
pub fn parse_header_arg(s: &str) -> Result<(String, String), CliError> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| CliError::InvalidHeader(s.to_string()))?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(CliError::InvalidHeader(s.to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Expands an `@resource[/rest]` shorthand into the configured endpoint URL.
///
/// Anything not starting with `@` is returned unchanged.
pub fn resolve_target(url: &str, endpoints: &Endpoints) -> Result<String, CliError> {
    let Some(shorthand) = url.strip_prefix('@') else {
        return Ok(url.to_string());
    };

    let (resource, rest) = match shorthand.split_once('/') {
        Some((resource, rest)) => (resource, Some(rest)),
        None => (shorthand, None),
    };
    let base = endpoints
        .get(resource)
        .ok_or_else(|| CliError::UnknownResource(resource.to_string()))?;

    Ok(match rest {
        Some(rest) if !rest.is_empty() => format!("{}/{}", base.trim_end_matches('/'), rest),
        _ => base.to_string(),
    })
}

/// Runs a parsed command and returns the JSON to print
pub async fn execute(
    command: Command,
    config: &ApiConfig,
    client: &CachedApiClient,
) -> Result<Value, CliError> {
    match command {
        Command::Get {
            url,
            ttl,
            no_cache,
            stale_on_error,
            request,
        } => {
            let url = resolve_target(&url, &config.endpoints)?;
            let mut options = request.to_options()?;
            options.skip_cache = no_cache;
            options.stale_on_error = stale_on_error;
            let ttl = ttl.map(|tier| config.ttl(tier));
            Ok(client.get(&url, &options, ttl).await?)
        }
        Command::Post { url, body, request } => {
            let url = resolve_target(&url, &config.endpoints)?;
            Ok(client.post(&url, &body.to_value()?, &request.to_options()?).await?)
        }
        Command::Put { url, body, request } => {
            let url = resolve_target(&url, &config.endpoints)?;
            Ok(client.put(&url, &body.to_value()?, &request.to_options()?).await?)
        }
        Command::Patch { url, body, request } => {
            let url = resolve_target(&url, &config.endpoints)?;
            Ok(client.patch(&url, &body.to_value()?, &request.to_options()?).await?)
        }
        Command::Delete { url, request } => {
            let url = resolve_target(&url, &config.endpoints)?;
            Ok(client.delete(&url, &request.to_options()?).await?)
        }
        Command::Login {
            token,
            username,
            password,
        } => {
            let token = match (token, username, password) {
                (Some(token), _, _) => token,
                (None, Some(username), Some(password)) => {
                    let credentials = json!({ "username": username, "password": password });
                    let response: Value = client
                        .post(
                            &config.endpoints.auth,
                            &credentials,
                            &RequestOptions::new().skip_auth(),
                        )
                        .await?;
                    extract_token(&response).ok_or(CliError::MissingToken)?
                }
                _ => return Err(CliError::MissingCredentials),
            };
            client.tokens().set_token(&token);
            Ok(json!({ "authenticated": true }))
        }
        Command::Logout => {
            client.tokens().clear_token();
            let removed = client.clear_cache();
            Ok(json!({ "authenticated": false, "cache_entries_removed": removed }))
        }
        Command::Cache {
            action: CacheCommand::Clear,
        } => {
            let removed = client.clear_cache();
            Ok(json!({ "cache_entries_removed": removed }))
        }
    }
}

/// Finds the bearer token in a login response
fn extract_token(response: &Value) -> Option<String> {
    ["token", "accessToken", "access_token"]
        .iter()
        .find_map(|field| response.get(*field).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_arg() {
        let (name, value) = parse_header_arg("X-Request-Id: abc-123").unwrap();
        assert_eq!(name, "X-Request-Id");
        assert_eq!(value, "abc-123");
    }

    #[test]
    fn test_parse_header_arg_keeps_colons_in_value() {
        let (name, value) = parse_header_arg("X-Callback:http://localhost:9000/hook").unwrap();
        assert_eq!(name, "X-Callback");
        assert_eq!(value, "http://localhost:9000/hook");
    }

    #[test]
    fn test_parse_header_arg_invalid() {
        let result = parse_header_arg("no-colon-here");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid header"));
        assert!(err.to_string().contains("no-colon-here"));

        assert!(parse_header_arg(":value").is_err());
        assert!(parse_header_arg("bad name:value").is_err());
    }

    #[test]
    fn test_resolve_target_shorthand() {
        let endpoints = Endpoints::under("https://api.example.com");

        assert_eq!(
            resolve_target("@clients", &endpoints).unwrap(),
            "https://api.example.com/clients"
        );
        assert_eq!(
            resolve_target("@units/12/documents", &endpoints).unwrap(),
            "https://api.example.com/units/12/documents"
        );
        assert_eq!(resolve_target("/widgets", &endpoints).unwrap(), "/widgets");
    }

    #[test]
    fn test_resolve_target_unknown_resource() {
        let endpoints = Endpoints::under("https://api.example.com");
        let err = resolve_target("@tenants", &endpoints).unwrap_err();
        assert!(err.to_string().contains("tenants"));
    }

    #[test]
    fn test_body_defaults_to_empty_object() {
        assert_eq!(BodyArgs::default().to_value().unwrap(), json!({}));
    }

    #[test]
    fn test_body_rejects_invalid_json() {
        let body = BodyArgs {
            data: Some("{name:".to_string()),
        };
        assert!(matches!(body.to_value(), Err(CliError::InvalidBody(_))));
    }

    #[test]
    fn test_request_args_to_options() {
        let args = RequestArgs {
            headers: vec!["X-Tenant: north".to_string()],
            no_auth: true,
        };

        let options = args.to_options().unwrap();

        assert!(options.skip_auth);
        assert_eq!(options.headers.get("X-Tenant").map(String::as_str), Some("north"));
    }

    #[test]
    fn test_extract_token_variants() {
        assert_eq!(extract_token(&json!({"token": "t1"})).as_deref(), Some("t1"));
        assert_eq!(extract_token(&json!({"accessToken": "t2"})).as_deref(), Some("t2"));
        assert_eq!(extract_token(&json!({"access_token": "t3"})).as_deref(), Some("t3"));
        assert!(extract_token(&json!({"token": ""})).is_none());
        assert!(extract_token(&json!({"user": {}})).is_none());
    }

    #[test]
    fn test_cli_parse_get_with_ttl() {
        let cli = Cli::parse_from(["estatedesk", "get", "@units", "--ttl", "medium", "--stale-on-error"]);
        match cli.command {
            Command::Get {
                url,
                ttl,
                no_cache,
                stale_on_error,
                ..
            } => {
                assert_eq!(url, "@units");
                assert_eq!(ttl, Some(CacheTier::Medium));
                assert!(!no_cache);
                assert!(stale_on_error);
            }
            other => panic!("Expected Get, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_post_with_headers() {
        let cli = Cli::parse_from([
            "estatedesk",
            "post",
            "/documents",
            "--data",
            "{\"title\":\"Lease\"}",
            "-H",
            "X-Tenant: north",
            "--no-auth",
        ]);
        match cli.command {
            Command::Post { url, body, request } => {
                assert_eq!(url, "/documents");
                assert_eq!(body.to_value().unwrap(), json!({"title": "Lease"}));
                assert_eq!(request.headers, vec!["X-Tenant: north".to_string()]);
                assert!(request.no_auth);
            }
            other => panic!("Expected Post, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_login_token_conflicts_with_credentials() {
        let result = Cli::try_parse_from(["estatedesk", "login", "--token", "t", "--username", "u"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_login_username_requires_password() {
        let result = Cli::try_parse_from(["estatedesk", "login", "--username", "u"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_cache_clear() {
        let cli = Cli::parse_from(["estatedesk", "cache", "clear"]);
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheCommand::Clear
            }
        ));
    }
}
