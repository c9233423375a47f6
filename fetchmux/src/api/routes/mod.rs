//! API route modules.
//!
//! Organizes routes by resource type.

pub mod config;
pub mod downloads;
pub mod health;
pub mod info;

use axum::{Router, routing::get};
use tower_http::services::ServeDir;

use crate::api::models::DOWNLOADS_ROUTE;
use crate::api::openapi::openapi_json;
use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let download_dir = state.config.transcode.download_dir.clone();

    let api = Router::new()
        .merge(downloads::router())
        .merge(info::router())
        .merge(config::router())
        .route("/openapi.json", get(openapi_json))
        .nest("/health", health::router());

    Router::new()
        .nest("/api", api)
        .nest_service(DOWNLOADS_ROUTE, ServeDir::new(download_dir))
        .with_state(state)
}
