//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http::StatusCode;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::proxy::compose::Dispatcher;
use crate::stats::ProxyStats;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub dispatcher: Dispatcher,
    pub stats: ProxyStats,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health).post(handle_rpc))
        .route("/api/stats", get(handle_get_stats).post(handle_rpc))
        .fallback(handle_rpc)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "bundler-proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("bundler-proxy shut down gracefully");
    Ok(())
}

/// JSON-RPC entry point. Every POST lands here, including POSTs to the admin
/// paths.
async fn handle_rpc(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let headers = request.headers().clone();
    let body = match axum::body::to_bytes(request.into_body(), state.config.server.max_body_bytes).await
    {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    state.dispatcher.handle(&headers, body).await
}

/// GET /api/stats: current dispatch statistics.
async fn handle_get_stats(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.stats.snapshot()).into_response()
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
