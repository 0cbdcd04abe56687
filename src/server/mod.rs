//! Admin HTTP server
//!
//! Exposes health, Prometheus metrics, manual cache triggers and a few read
//! accessors over the running [`CacheSystem`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cfmirror::cache::CacheSystem;
//! use cfmirror::server::{AdminServer, AppState};
//!
//! # async fn demo(caches: Arc<CacheSystem>) -> anyhow::Result<()> {
//! let server = AdminServer::new("127.0.0.1:8089".parse()?, AppState::new(caches));
//! server.start_with_shutdown(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::cache::CacheSystem;

pub use api::{create_router, ApiResponse, ErrorResponse, HealthResponse};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Every cache of the running mirror
    pub caches: Arc<CacheSystem>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(caches: Arc<CacheSystem>) -> Self {
        Self {
            caches,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Admin Server
// ============================================================================

pub struct AdminServer {
    bind_addr: SocketAddr,
    state: AppState,
}

impl AdminServer {
    pub fn new(bind_addr: SocketAddr, state: AppState) -> Self {
        Self { bind_addr, state }
    }

    /// Router with all routes and request tracing
    pub fn build_router(&self) -> Router {
        create_router(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        self.serve(listener, shutdown_signal).await
    }

    /// Serve on an already bound listener until `shutdown_signal` resolves
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        tracing::info!(%addr, "Admin server listening");

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Admin server shutdown complete");
        Ok(())
    }
}

/// Server errors
#[derive(Error, Debug, Clone)]
pub enum ServerError {
    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}
