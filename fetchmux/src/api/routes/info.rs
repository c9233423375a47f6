//! URL metadata route.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::InfoRequest;
use crate::api::server::AppState;
use crate::info::MediaInfo;

pub fn router() -> Router<AppState> {
    Router::new().route("/info", post(get_info))
}

/// Title, thumbnail and suggested format for a URL.
#[utoipa::path(
    post,
    path = "/api/info",
    tag = "info",
    request_body = InfoRequest,
    responses(
        (status = 200, description = "Media information", body = MediaInfo),
        (status = 400, description = "Missing or malformed URL", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_info(
    State(state): State<AppState>,
    Json(request): Json<InfoRequest>,
) -> ApiResult<Json<MediaInfo>> {
    let url = request
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("url is required"))?;

    let info = state.info.lookup(&url, &state.config.transcode).await?;
    Ok(Json(info))
}
