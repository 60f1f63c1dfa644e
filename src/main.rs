//! EstateDesk CLI - query the document and process management API
//!
//! Thin front end over `CachedApiClient`. The token and cached responses are
//! kept in a JSON store under the user's data directory.

use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use estatedesk::cli::{execute, Cli};
use estatedesk::storage::{FileStore, KeyValueStore, MemoryStore};
use estatedesk::{ApiConfig, CachedApiClient};

/// Sends log output to stderr so stdout stays valid JSON
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = ApiConfig::from_env()?;

    let store: Arc<dyn KeyValueStore> = match FileStore::new() {
        Some(store) => Arc::new(store),
        None => {
            warn!("no data directory available, token and cache will not persist");
            Arc::new(MemoryStore::new())
        }
    };
    let client = CachedApiClient::with_store(config.client_config(), store);

    let output = execute(cli.command, &config, &client).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
