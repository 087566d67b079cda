//! Prometheus endpoint.
//!
//! Serves `/metrics` in Prometheus text format and `/health` for liveness
//! probes until the shutdown token is cancelled.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Install the Prometheus recorder and serve it on `addr`.
///
/// The server task stops when `shutdown` is cancelled.
pub fn init(addr: SocketAddr, shutdown: CancellationToken) -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    tokio::spawn(run_server(addr, handle, shutdown));

    Ok(())
}

async fn run_server(addr: SocketAddr, handle: PrometheusHandle, shutdown: CancellationToken) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(Extension(handle));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind metrics server");
            return;
        }
    };

    info!(%addr, "Metrics server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        error!(error = %e, "Metrics server error");
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}
