//! Client configuration route.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::ConfigResponse;
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/config", get(get_config))
}

/// Formats and UI settings the web client needs.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    responses((status = 200, description = "Client configuration", body = ConfigResponse))
)]
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        formats: config.transcode.allowed_formats.clone(),
        default_format: config.transcode.default_format.clone(),
        ui: config.ui.clone(),
        auto_download: config.auto_download,
    })
}
