//! Task state as tracked by the store.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Finalizing,
    Done,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to the live subprocess of a task.
///
/// The child itself is owned by the monitor task; others reach it through the
/// token, which the monitor turns into an interrupt.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub cancel: CancellationToken,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            cancel: CancellationToken::new(),
        }
    }
}

/// One requested conversion.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub source_url: String,
    pub temp_file: PathBuf,
    pub out_file: PathBuf,
    pub output_format: String,
    pub process: Option<ProcessHandle>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A freshly registered task: `pending`, 0%, fresh UUID.
    pub fn new(
        source_url: impl Into<String>,
        temp_file: PathBuf,
        out_file: PathBuf,
        output_format: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            progress: 0,
            message: "Queued".to_string(),
            source_url: source_url.into(),
            temp_file,
            out_file,
            output_format: output_format.into(),
            process: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a live primary subprocess can be interrupted.
    pub fn is_cancellable(&self) -> bool {
        self.status == TaskStatus::Running && self.process.is_some()
    }

    /// File name of the output, without its directory.
    pub fn out_file_name(&self) -> Option<String> {
        self.out_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new(
            "https://x/a.mp4",
            PathBuf::from("/d/a_tmp.mp4"),
            PathBuf::from("/d/a.mp4"),
            "mp4",
        );
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert!(task.process.is_none());
        assert!(!task.is_cancellable());
        assert_eq!(task.out_file_name().as_deref(), Some("a.mp4"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Finalizing).unwrap();
        assert_eq!(json, "\"finalizing\"");
        assert_eq!(TaskStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Finalizing.is_terminal());
    }
}
