//! Start, poll and cancel routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    CancelRequest, CancelResponse, DownloadRequest, DownloadResponse, ProgressResponse,
};
use crate::api::server::AppState;
use crate::transcode::StartRequest;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/download", post(start_download))
        .route("/progress/{task_id}", get(get_progress))
        .route("/cancel", post(cancel_download))
}

/// Register a conversion task.
#[utoipa::path(
    post,
    path = "/api/download",
    tag = "downloads",
    request_body = DownloadRequest,
    responses(
        (status = 202, description = "Task registered", body = DownloadResponse),
        (status = 400, description = "Missing URL or format not allowed", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<(StatusCode, Json<DownloadResponse>)> {
    let url = request
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("url is required"))?;

    let start = StartRequest {
        url,
        name: request.name,
        format: request.format,
    };
    let task_id = state.supervisor.start(start)?;

    Ok((StatusCode::ACCEPTED, Json(DownloadResponse { task_id })))
}

/// Current status of a task.
#[utoipa::path(
    get,
    path = "/api/progress/{task_id}",
    tag = "downloads",
    params(("task_id" = String, Path, description = "Task id returned by /api/download")),
    responses(
        (status = 200, description = "Task state", body = ProgressResponse),
        (status = 404, description = "Unknown task", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<ProgressResponse>> {
    let task = state
        .supervisor
        .store()
        .get(&task_id)
        .ok_or_else(|| ApiError::not_found(format!("Task with id '{}' not found", task_id)))?;

    Ok(Json(ProgressResponse::from(&task)))
}

/// Interrupt a running task.
#[utoipa::path(
    post,
    path = "/api/cancel",
    tag = "downloads",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Task cancelled", body = CancelResponse),
        (status = 400, description = "Missing task id", body = crate::api::error::ApiErrorResponse),
        (status = 404, description = "Unknown task", body = crate::api::error::ApiErrorResponse),
        (status = 409, description = "No live process to cancel", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn cancel_download(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<CancelResponse>> {
    let task_id = request
        .task_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("taskId is required"))?;

    state.supervisor.cancel(task_id.trim())?;

    Ok(Json(CancelResponse { ok: true }))
}
