//! `bastion serve`: run the gateway

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use bastion_core::config::GatewayConfig;
use bastion_gateway::{server, GatewayState};

/// Run the gateway until Ctrl-C or SIGTERM
pub async fn run(config: GatewayConfig) -> Result<()> {
    let state = Arc::new(GatewayState::from_config(config).context("Invalid gateway configuration")?);

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel_clone.cancel();
    });

    server::serve(state, async move { cancel.cancelled().await }).await
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
