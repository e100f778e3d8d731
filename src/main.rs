//! Inventory Relay - Entry Point
//!
//! Wires the proxy pool, the fetcher and the API server, and shuts down
//! gracefully on Ctrl+C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use inventory_relay::api::middleware::TokenAuth;
use inventory_relay::api::{ApiServer, AppState};
use inventory_relay::config::LogConfig;
use inventory_relay::fetch::{HttpTransport, ResilientFetcher};
use inventory_relay::proxy::{ProxyPool, WebshareSource};
use inventory_relay::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log);

    info!("Starting Inventory Relay (preferred address {})", config.server_addr());

    let source = WebshareSource::new(&config.provider).context("Failed to build proxy source")?;
    let pool = Arc::new(ProxyPool::new(Arc::new(source), config.pool.clone()));

    // Warm the pool; the first pick retries if this fails.
    match pool.refresh_if_stale().await {
        Ok(()) => info!("Loaded {} proxies", pool.stats().total_proxies),
        Err(e) => warn!("Initial proxy refresh failed: {}", e),
    }

    let transport = HttpTransport::new(config.fetch.attempt_timeout)
        .context("Failed to build HTTP transport")?;
    let fetcher = Arc::new(ResilientFetcher::new(pool, Arc::new(transport), &config.fetch));
    info!(
        "Using selection policy {} with {} attempts",
        fetcher.policy().as_str(),
        fetcher.max_attempts()
    );

    let auth = TokenAuth::from_config(&config.server.auth_token)
        .context("Failed to set up API token")?;
    let state = AppState::new(fetcher, auth, config.server.request_timeout);
    let api_server = ApiServer::new(config.server.clone(), state);

    let listener = api_server.bind().await.context("Failed to bind API server")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(listener, shutdown_rx).await {
            error!("API server error: {}", e);
        }
    });

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = api_task.await;

    info!("Inventory Relay stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("inventory_relay={},tower_http=info", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
