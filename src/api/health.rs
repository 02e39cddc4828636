/// Health probes and the Prometheus scrape endpoint
///
/// - `/health`: status, version and the object store backend in use
/// - `/health/live`: answers whenever the process does
/// - `/health/ready`: 503 while the object store is unreachable
/// - `/metrics`: Prometheus text format

use crate::{context::AppContext, jobs, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// "ok" or "degraded"
    pub status: String,
    pub version: String,
    /// Object store backend name
    pub store: String,
    /// Verification code cache backend name
    pub verification: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/metrics", get(metrics_endpoint))
}

pub async fn health(State(ctx): State<AppContext>) -> Json<HealthStatus> {
    let start = Instant::now();
    let probe = jobs::tasks::health_check(&ctx).await;

    let (status, message) = match probe {
        Ok(()) => ("ok", None),
        Err(e) => {
            tracing::warn!(error = %e, "health_check_degraded: object store probe failed");
            ("degraded", Some("Object store is not answering".to_string()))
        }
    };

    tracing::debug!(
        status = status,
        duration_ms = start.elapsed().as_millis(),
        "health_check_completed"
    );

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: ctx.store.backend_name().to_string(),
        verification: ctx.verification.backend_name().to_string(),
        uptime_seconds: ctx.started_at.elapsed().as_secs(),
        message,
    })
}

pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = jobs::tasks::health_check(&ctx).await {
        tracing::warn!(error = %e, "readiness_probe_failed: object store check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}
