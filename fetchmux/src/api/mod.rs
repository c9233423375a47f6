//! HTTP facade over the transcode core.
//!
//! Handlers stay thin: they validate the request body, call into the
//! supervisor or store, and map [`crate::Error`] to status codes through
//! [`error::ApiError`].

pub mod error;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
