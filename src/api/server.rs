//! API server using Axum
//!
//! Serves the inventory endpoint plus health/status.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use axum::middleware;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ServerConfig;
use crate::error::{RelayError, Result};
use crate::fetch::ResilientFetcher;

use super::middleware::{RequestLogging, TokenAuth};
use super::port;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<ResilientFetcher>,
    pub auth: TokenAuth,
    pub request_timeout: Duration,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(fetcher: Arc<ResilientFetcher>, auth: TokenAuth, request_timeout: Duration) -> Self {
        Self {
            fetcher,
            auth,
            request_timeout,
            started_at: Instant::now(),
        }
    }
}

impl FromRef<AppState> for TokenAuth {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// API server
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
            .layer(middleware::from_fn(RequestLogging::log_request))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the preferred port, or the first free fallback port
    pub async fn bind(&self) -> Result<TcpListener> {
        port::bind_available(&self.config.host, self.config.port).await
    }

    /// Run the API server
    #[instrument(skip(self, listener, shutdown))]
    pub async fn run(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        let router = self.build_router();

        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| RelayError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
