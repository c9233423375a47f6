//! OpenAPI document served at `/api/openapi.json`.

use axum::Json;
use utoipa::OpenApi;

use crate::api::error::ApiErrorResponse;
use crate::api::models::{
    CancelRequest, CancelResponse, ConfigResponse, DownloadRequest, DownloadResponse,
    HealthResponse, InfoRequest, ProgressResponse, TranscoderHealth,
};
use crate::config::UiText;
use crate::info::{MediaInfo, SourceKind};
use crate::transcode::TaskStatus;

/// Liveness check response.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct LivenessResponse {
    /// Status indicator (always "alive" if responding)
    pub status: String,
    /// Server uptime in seconds
    pub uptime_secs: u64,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "fetchmux API",
        description = "Fetch media URLs, remux them with ffmpeg and track progress.",
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:4000", description = "Local development server")
    ),
    tags(
        (name = "downloads", description = "Start, poll and cancel conversion tasks"),
        (name = "info", description = "URL metadata lookup"),
        (name = "config", description = "Client configuration"),
        (name = "health", description = "Health check endpoints for monitoring and orchestration")
    ),
    paths(
        crate::api::routes::downloads::start_download,
        crate::api::routes::downloads::get_progress,
        crate::api::routes::downloads::cancel_download,
        crate::api::routes::info::get_info,
        crate::api::routes::config::get_config,
        crate::api::routes::health::health_check,
        crate::api::routes::health::liveness_check,
    ),
    components(schemas(
        ApiErrorResponse,
        CancelRequest,
        CancelResponse,
        ConfigResponse,
        DownloadRequest,
        DownloadResponse,
        HealthResponse,
        InfoRequest,
        LivenessResponse,
        MediaInfo,
        ProgressResponse,
        SourceKind,
        TaskStatus,
        TranscoderHealth,
        UiText,
    ))
)]
pub struct ApiDoc;

/// Serve the generated document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
