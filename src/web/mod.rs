//! The web module for handling the Axum API.
//! This file declares the other files in this directory as sub-modules.

pub mod api;
pub mod models;

use crate::motion::MotionController;
use std::sync::Arc;

/// Serve the API on `bind` until Ctrl-C.
pub async fn serve(controller: Arc<MotionController>, bind: &str) -> std::io::Result<()> {
    let app = api::create_router(controller);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down web API");
        })
        .await
}
