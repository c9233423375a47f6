//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::UiText;
use crate::transcode::{Task, TaskStatus};

/// URL prefix under which finished files are served.
pub const DOWNLOADS_ROUTE: &str = "/downloads";

/// Request body for `POST /api/download`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Media URL to fetch.
    pub url: Option<String>,
    /// Base name of the output file, without extension.
    pub name: Option<String>,
    /// Output container, e.g. `mp4`.
    pub format: Option<String>,
}

/// Response body for `POST /api/download`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub task_id: String,
}

/// Response body for `GET /api/progress/{taskId}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub status: TaskStatus,
    /// Percentage, 0 to 100.
    pub progress: u8,
    pub message: String,
    /// File name of the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_file: Option<String>,
    /// Where the finished file can be fetched; set once the task is done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl From<&Task> for ProgressResponse {
    fn from(task: &Task) -> Self {
        let out_file = task.out_file_name();
        let file_url = match task.status {
            TaskStatus::Done => out_file.as_deref().and_then(download_url),
            _ => None,
        };
        Self {
            status: task.status,
            progress: task.progress,
            message: task.message.clone(),
            out_file,
            file_url,
        }
    }
}

/// Public URL path of a file in the download directory.
pub fn download_url(file_name: &str) -> Option<String> {
    let mut url = url::Url::parse("http://localhost").ok()?;
    url.path_segments_mut()
        .ok()?
        .push(DOWNLOADS_ROUTE.trim_start_matches('/'))
        .push(file_name);
    Some(url.path().to_string())
}

/// Request body for `POST /api/cancel`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub task_id: Option<String>,
}

/// Response body for `POST /api/cancel`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancelResponse {
    pub ok: bool,
}

/// Request body for `POST /api/info`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct InfoRequest {
    pub url: Option<String>,
}

/// Response body for `GET /api/config`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub formats: Vec<String>,
    pub default_format: String,
    pub ui: UiText,
    pub auto_download: bool,
}

/// Transcoder availability as seen at startup.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TranscoderHealth {
    pub available: bool,
    /// File name of the binary; its directory is not exposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Response body for `GET /api/health`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` with a transcoder, `degraded` on the HTTP fallback.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub transcoder: TranscoderHealth,
    /// Tasks tracked since startup.
    pub tasks: usize,
}
