//! Health check routes.

use std::path::Path;

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::{HealthResponse, TranscoderHealth};
use crate::api::openapi::LivenessResponse;
use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let transcoder = state.supervisor.transcoder();
    let status = if transcoder.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        transcoder: TranscoderHealth {
            available: transcoder.is_some(),
            binary: transcoder.and_then(|t| binary_name(&t.binary_path)),
            version: transcoder.map(|t| t.version.clone()),
        },
        tasks: state.supervisor.store().len(),
    })
}

fn binary_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Liveness check - is the service alive?
#[utoipa::path(
    get,
    path = "/api/health/live",
    tag = "health",
    responses((status = 200, description = "Service is responsive", body = LivenessResponse))
)]
pub async fn liveness_check(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
