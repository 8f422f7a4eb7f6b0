//! proctor-server - HTTP and WebSocket transport for the proctoring engine
//!
//! Student browsers stream detector samples over `/ws`; admin dashboards join
//! the same socket to watch every session, and use the REST API under
//! `/api` to list, inspect and force-close sessions.

mod error;
pub mod http;
mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use proctor_core::{EndReason, SessionRegistry};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use error::{ErrorResponse, ServerError};
pub use http::create_router;
pub use state::AppState;

/// The proctor server
pub struct ProctorServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ProctorServer {
    /// Create a server around a session registry
    pub fn new(config: ServerConfig, registry: Arc<SessionRegistry>) -> Self {
        Self::with_state(config, Arc::new(AppState::new(registry)))
    }

    /// Create a server with pre-built state
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        info!("proctor server listening on {}", addr);
        self.run_with_listener(listener).await
    }

    /// Serve on an already-bound listener
    ///
    /// On shutdown every live session is force-closed so its record reaches
    /// storage.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let router = create_router(Arc::clone(&self.state));

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

        let records = self.state.registry.end_all(EndReason::ForceClosed).await;
        info!(closed = records.len(), "proctor server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7433,
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the socket address string (e.g., "0.0.0.0:7433")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
