//! fetchmux library crate.
//!
//! Takes media URLs, runs them through ffmpeg (stream copy, optional remux)
//! and tracks each conversion as a pollable, cancellable task. The binary in
//! `main.rs` wires these pieces behind an HTTP API.

pub mod api;
pub mod config;
pub mod error;
pub mod info;
pub mod logging;
pub mod transcode;
pub mod utils;

pub use error::{Error, Result};
