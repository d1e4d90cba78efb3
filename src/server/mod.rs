//! HTTP control plane: run submission, status, stop, and the event stream.

pub mod api;
pub mod stream;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

pub use api::{AppState, SharedState, api_router};

use crate::runtime::Runtime;

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    let cors = state.runtime.config.server.cors_permissive;
    let mut app = api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn start_server(runtime: Arc<Runtime>) -> Result<()> {
    let sweeper = runtime.spawn_sweeper();
    let addr = runtime.config.server.bind_addr();
    let app = build_router(Arc::new(AppState::new(runtime)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "checkloop listening");
    println!("checkloop running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
