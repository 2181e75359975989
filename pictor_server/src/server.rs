use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use pictor::{Pictor, PictorError};
use pictor_config::PictorConfig;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::handlers;

/// Transport configuration for the HTTP listener.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Network interface to bind to (e.g. "127.0.0.1" or "0.0.0.0").
    pub host: String,
    /// TCP port number for the HTTP server.
    pub port: u16,
    /// Enable permissive CORS headers.
    pub cors: bool,
    /// Prefix stripped from incoming request paths before routing.
    pub path_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors: false,
            path_prefix: String::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_config(config: &PictorConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            cors: config.server.cors,
            path_prefix: config.server.path_prefix.trim_matches('/').to_string(),
        }
    }
}

pub(crate) struct AppState {
    pub app: Pictor,
    pub path_prefix: String,
}

/// The HTTP server wrapping a [`Pictor`] service.
pub struct Server {
    state: Arc<AppState>,
    config: ServerConfig,
}

impl Server {
    pub fn new(app: Pictor, config: ServerConfig) -> Self {
        let state = Arc::new(AppState {
            app,
            path_prefix: config.path_prefix.clone(),
        });
        Self { state, config }
    }

    /// Returns the server's bind address as "host:port".
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Build the axum router serving the image endpoint plus the params and
    /// health introspection routes.
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/", get(handlers::index))
            .route("/healthz", get(handlers::health_check))
            .route("/{*path}", get(handlers::handle))
            .with_state(self.state.clone());
        if self.config.cors {
            router.layer(CorsLayer::very_permissive())
        } else {
            router
        }
    }

    /// Run until interrupted.
    pub async fn run(&self) -> pictor::Result<()> {
        let addr: SocketAddr = self
            .addr()
            .parse()
            .map_err(|e| PictorError::Internal(format!("failed to parse address: {e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PictorError::Internal(format!("failed to bind to {addr}: {e}")))?;
        tracing::info!("listening on {addr}");

        axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| PictorError::Internal(format!("server error: {e}")))
    }

    /// Run until a shutdown signal arrives on the provided channel. Useful
    /// for tests that need programmatic control over the server lifecycle.
    pub async fn run_until_stopped(&self, shutdown_rx: tokio::sync::oneshot::Receiver<()>) -> pictor::Result<()> {
        let addr: SocketAddr = self
            .addr()
            .parse()
            .map_err(|e| PictorError::Internal(format!("failed to parse address: {e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PictorError::Internal(format!("failed to bind to {addr}: {e}")))?;
        tracing::info!("listening on {addr}");

        axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(|e| PictorError::Internal(format!("server error: {e}")))
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
