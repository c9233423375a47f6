//! Direct HTTP download used when no transcoder is installed.
//!
//! Only resources the server itself labels as video (or as an opaque byte
//! stream) are fetched; pages and playlists need a real transcoder.

use std::path::Path;

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::utils::fs::remove_file_if_exists;
use crate::{Error, Result};

/// How a fallback fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed,
    Cancelled,
}

/// Whether a `Content-Type` value names something worth downloading.
pub fn is_direct_media(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("video/") || mime == "application/octet-stream"
}

/// Streams a URL straight into a file.
#[derive(Debug, Clone)]
pub struct HttpFallback {
    client: reqwest::Client,
}

impl HttpFallback {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url` into `dest`.
    ///
    /// `on_progress` receives percentages when the server announces a length.
    /// On cancellation the partial file is left for the caller to discard;
    /// on any error it is removed here.
    pub async fn fetch<F>(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<FetchOutcome>
    where
        F: FnMut(u8),
    {
        let head = self.client.head(url).send().await?;
        let content_type = head
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_direct_media(&content_type) {
            return Err(Error::Other(format!(
                "URL is not a direct video resource (content-type '{content_type}')"
            )));
        }

        let response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length().filter(|len| *len > 0);
        debug!(url, ?total, "Fallback download started");

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::io_path("creating", dest, e))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    drop(file);
                    return Ok(FetchOutcome::Cancelled);
                }
                chunk = stream.next() => {
                    let Some(chunk) = chunk else { break };
                    let written_chunk = match chunk {
                        Ok(chunk) => file
                            .write_all(&chunk)
                            .await
                            .map(|()| chunk.len() as u64)
                            .map_err(|e| Error::io_path("writing", dest, e)),
                        Err(e) => Err(e.into()),
                    };
                    match written_chunk {
                        Ok(len) => written += len,
                        Err(e) => {
                            drop(file);
                            discard_partial(dest).await;
                            return Err(e);
                        }
                    }
                    if let Some(total) = total {
                        on_progress(((written.min(total) * 100) / total) as u8);
                    }
                }
            }
        }

        if let Err(e) = file.flush().await {
            drop(file);
            discard_partial(dest).await;
            return Err(Error::io_path("flushing", dest, e));
        }
        debug!(url, written, "Fallback download finished");
        Ok(FetchOutcome::Completed)
    }
}

async fn discard_partial(dest: &Path) {
    if let Err(e) = remove_file_if_exists(dest).await {
        warn!(file = %dest.display(), error = %e, "Failed to remove partial download");
    }
}
