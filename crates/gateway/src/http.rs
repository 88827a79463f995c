//! Liveness and readiness probes.

use crate::gateway::Gateway;
use axum::{
    Extension, Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use std::future::Future;
use tokio::net::TcpListener;

pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(Extension(gateway))
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Ready once the documentation cache has been populated.
async fn readyz(Extension(gateway): Extension<Gateway>) -> impl IntoResponse {
    let report = gateway.health_report();
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

/// Serve the probe router until `shutdown` resolves.
///
/// # Errors
///
/// Returns the server's I/O error.
pub async fn serve(
    listener: TcpListener,
    gateway: Gateway,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await
}
