//! swcache server entry point.
//!
//! Boots the offline cache engine and exposes it as an MCP server on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use swcache_client::{FetchClient, FetchConfig};
use swcache_core::engine::{EngineOptions, Registration};
use swcache_core::{AppConfig, CacheDb, Engine, Network};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(origin = %config.origin, version = %config.engine_version, "starting swcache server on stdio transport");

    let cache = CacheDb::open(&config.db_path)
        .await
        .map_err(|e| anyhow!("opening cache at {}: {}", config.db_path.display(), e))?;
    let client = FetchClient::new(FetchConfig::from_app_config(&config)).map_err(|e| anyhow!("{e}"))?;
    let network: Arc<dyn Network> = Arc::new(client);
    let options = EngineOptions::from_config(&config)?;
    let origin = options.origin.clone();

    let registration = Arc::new(Registration::new());
    match registration
        .register(Engine::new(options, cache.clone(), network.clone()))
        .await
    {
        Ok(report) => tracing::info!(
            static_cached = report.install.static_cached,
            images_cached = report.install.images_cached,
            images_failed = report.install.images_failed,
            activated = report.activation.is_some(),
            "engine registered"
        ),
        Err(e) => tracing::error!("engine registration failed, requests pass through: {}", e),
    }

    let handler = handler::SwCacheServer::new(registration, cache, network, origin);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
