//! Proxy Server - Axum HTTP server

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::proxy::arkose::{build_provisioner, TokenProvisioner};
use crate::proxy::upstream::client::UpstreamClient;
use crate::proxy::ProxyConfig;

/// Largest inbound body accepted on any route
pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub provisioner: Arc<dyn TokenProvisioner>,
    pub config: Arc<ProxyConfig>,
}

impl AppState {
    pub fn new(
        upstream: UpstreamClient,
        provisioner: Arc<dyn TokenProvisioner>,
        config: ProxyConfig,
    ) -> Self {
        Self {
            upstream: Arc::new(upstream),
            provisioner,
            config: Arc::new(config),
        }
    }

    /// Build the transport, token strategy and upstream settings from config
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream, &config.timeouts)?;
        let provisioner = build_provisioner(&config.arkose, upstream.clone());
        let proxy_config = ProxyConfig::from_config(config)?;
        Ok(Self::new(upstream, provisioner, proxy_config))
    }
}

/// Routes of the proxy, with CORS and request tracing applied
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", any(health_check_handler))
        .route("/status", get(status_handler))
        .route("/api/*path", any(crate::proxy::handlers::chatgpt::handle_api))
        .route("/files", post(crate::proxy::handlers::files::handle_create_file))
        .route("/process_upload", post(crate::proxy::handlers::files::handle_process_upload))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Proxy server instance
pub struct ProxyServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ProxyServer {
    pub fn new(host: String, port: u16, state: AppState) -> Self {
        Self { host, port, state }
    }

    /// Run the proxy server (blocking)
    pub async fn run(self) -> anyhow::Result<()> {
        let app = build_router(self.state);

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Proxy server listening on {}", addr);

        // Handle graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

/// Health check handler
async fn health_check_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Availability check used by `gptproxy status`
async fn status_handler() -> Response {
    (StatusCode::OK, Json("OK")).into_response()
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
