//! HTTP and WebSocket surface
//!
//! A thin axum layer that turns browser requests into calls on the bridge
//! and transfer components.

mod http;
mod params;
mod ws;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

pub use http::{AccessSummary, DownloadQuery};
pub use params::{ConnectParams, ParamError};
pub use ws::{WsSink, WsSource};

use crate::state::GatewayState;

/// Build the gateway router
pub fn router(state: Arc<GatewayState>) -> Router {
    let upload_limit = usize::try_from(state.config.transfer.max_http_upload).unwrap_or(usize::MAX);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route(
            "/upload",
            post(http::upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/download", get(http::download_handler))
        .route("/api/access", get(http::access_handler))
        .route("/healthz", get(http::health_handler))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// Live sessions are cancelled when shutdown begins; each runs its own
/// teardown before the connection count reaches zero.
pub async fn serve_with_listener<F>(
    state: Arc<GatewayState>,
    listener: TcpListener,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sessions = Arc::clone(&state.sessions);
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let cancelled = sessions.cancel_all();
            tracing::info!("Shutting down, cancelled {} live sessions", cancelled);
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn serve<F>(state: Arc<GatewayState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = state.config.bind_address.clone();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Gateway listening on {}", listener.local_addr()?);
    serve_with_listener(state, listener, shutdown).await
}
