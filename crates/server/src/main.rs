//! catalogue-server entry point.
//!
//! Boots the update scheduler and the HTTP server. Logging is JSON on stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use catalogue_client::{GitHubConfig, GitHubSource};
use catalogue_core::{AppConfig, CatalogueCache, CatalogueStore, ServingPolicy, UpdateCoordinator};

mod error;
mod routes;
mod scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    match config.github.credentials() {
        Some((user, _)) => tracing::info!(user, "using Authorization Token header to authorize GitHub API calls"),
        None => tracing::info!("GitHub username and token not provided; continuing as anonymous user"),
    }

    let store = CatalogueStore::new(config.cache_dir.clone(), config.content_file.clone(), config.metadata_file.clone());
    store.ensure_dir().await?;
    let cache = Arc::new(CatalogueCache::open(store).await);

    let source = GitHubSource::new(GitHubConfig::from_app_config(&config))?;
    tracing::info!(url = %source.content_url(), "fetching catalogue from GitHub");

    let coordinator = Arc::new(UpdateCoordinator::new(Arc::clone(&cache), Arc::new(source)));
    let scheduler = scheduler::spawn(coordinator, config.fetch_interval());

    let app = routes::router(routes::AppState::new(cache, ServingPolicy::new(config.max_age_secs)));
    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "catalogue server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    scheduler.abort();
    tracing::info!("catalogue server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
