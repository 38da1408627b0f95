//! Liveness endpoint.
//!
//! `GET /health` always answers `200 OK` with body `OK`. It reports that
//! the process is up, not that the pipelines are healthy or the engine is
//! still running.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Router serving the liveness probe.
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Serve the liveness router on `listener` until `cancel` fires.
pub async fn serve(listener: TcpListener, cancel: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "health endpoint listening");
    }

    if let Err(e) = axum::serve(listener, router())
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
    {
        error!(error = %e, "health endpoint terminated");
    }
}
