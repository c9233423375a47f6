//! Spawns and watches the transcoder for each task.
//!
//! Every task gets one detached tokio task that owns its child process. That
//! task reads the diagnostic stream, feeds events into the store and carries
//! out the effects the reducer hands back (rename, remux, cleanup). Clients
//! only ever talk to the store and to the cancellation token kept in it.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::fallback::{FetchOutcome, HttpFallback};
use super::machine::{Effect, TaskEvent};
use super::parser::{self, ProgressTracker};
use super::paths;
use super::store::TaskStore;
use super::task::{ProcessHandle, Task};
use crate::config::TranscodeConfig;
use crate::utils::fs::{move_file, remove_file_if_exists};
use crate::{Error, Result};

/// Well-known install location probed when the configured binary fails.
pub const FALLBACK_FFMPEG_PATH: &str = "/usr/bin/ffmpeg";

/// Time a transcoder gets to exit after an interrupt before it is killed.
const INTERRUPT_GRACE: Duration = Duration::from_secs(10);

/// A transcoder binary that answered `-version`.
#[derive(Debug, Clone)]
pub struct Transcoder {
    pub binary_path: String,
    /// First line of the `-version` banner.
    pub version: String,
}

/// Run `<path> -version` and return the first line of its banner.
pub async fn detect_version(path: &str) -> Option<String> {
    let output = process_utils::tokio_command(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .and_then(|s| s.lines().next().map(|l| l.trim().to_string()))
}

/// Find a working transcoder: the configured binary first, then
/// [`FALLBACK_FFMPEG_PATH`].
pub async fn detect_transcoder(configured: &str) -> Option<Transcoder> {
    let mut candidates = vec![configured];
    if configured != FALLBACK_FFMPEG_PATH && Path::new(FALLBACK_FFMPEG_PATH).exists() {
        candidates.push(FALLBACK_FFMPEG_PATH);
    }

    for candidate in candidates {
        match detect_version(candidate).await {
            Some(version) => {
                return Some(Transcoder {
                    binary_path: candidate.to_string(),
                    version,
                });
            }
            None => debug!(binary = candidate, "Transcoder probe failed"),
        }
    }
    None
}

/// Arguments of the primary stream-copy run.
pub fn primary_args(url: &str, temp: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-hide_banner", "-i", url, "-c", "copy"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.extend(
        ["-bsf:a", "aac_adtstoasc", "-progress", "pipe:2", "-nostats"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(temp.as_os_str().to_owned());
    args
}

/// Arguments of the copy-remux from the temp file into the final container.
pub fn remux_args(temp: &Path, out: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-i".into(),
        temp.as_os_str().to_owned(),
        "-c".into(),
        "copy".into(),
        out.as_os_str().to_owned(),
    ]
}

/// A client request to fetch a URL.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub url: String,
    pub name: Option<String>,
    pub format: Option<String>,
}

impl StartRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Owns task lifecycles from start to a terminal status.
pub struct TranscodeSupervisor {
    config: TranscodeConfig,
    store: Arc<TaskStore>,
    transcoder: Option<Transcoder>,
    fallback: HttpFallback,
}

impl TranscodeSupervisor {
    /// `transcoder` is `None` when no binary answered the startup probe; tasks
    /// are then fetched over plain HTTP.
    pub fn new(
        config: TranscodeConfig,
        store: Arc<TaskStore>,
        transcoder: Option<Transcoder>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            transcoder,
            fallback: HttpFallback::new(http_client),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    pub fn transcoder(&self) -> Option<&Transcoder> {
        self.transcoder.as_ref()
    }

    /// Register a task and start working on it in the background.
    ///
    /// Returns the task id as soon as the task is pollable.
    pub fn start(self: &Arc<Self>, request: StartRequest) -> Result<String> {
        let url = validate_url(&request.url)?;
        let format = request
            .format
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        if let Some(format) = format {
            let format = format.trim_start_matches('.');
            if !self.config.is_allowed_format(format) {
                return Err(Error::validation(format!(
                    "format '{format}' is not allowed"
                )));
            }
        }

        let planned = paths::plan(
            &self.config.download_dir,
            url,
            request.name.as_deref(),
            format,
        );
        let task = Task::new(
            url,
            planned.temp_file,
            planned.out_file,
            planned.output_format,
        );
        info!(
            task_id = %task.id,
            url = %task.source_url,
            out_file = %task.out_file.display(),
            format = %task.output_format,
            "Task created"
        );
        let task_id = self.store.create(task);

        let this = Arc::clone(self);
        let id = task_id.clone();
        tokio::spawn(async move { this.run(id).await });

        Ok(task_id)
    }

    /// Interrupt the live transcoder of a task and mark it cancelled.
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        match self.store.apply(task_id, TaskEvent::CancelRequested)? {
            Effect::Interrupt(token) => {
                token.cancel();
                info!(task_id, "Task cancelled");
            }
            other => debug!(task_id, ?other, "Cancel produced no interrupt"),
        }
        Ok(())
    }

    async fn run(self: Arc<Self>, task_id: String) {
        let Some(task) = self.store.get(&task_id) else {
            warn!(task_id = %task_id, "Task vanished before it started");
            return;
        };

        let exit = match &self.transcoder {
            Some(transcoder) => self.run_primary(transcoder, &task).await,
            None => self.run_fallback(&task).await,
        };
        let Some(exit) = exit else {
            return;
        };

        let effect = self.dispatch(&task_id, exit);
        self.execute(&task_id, effect).await;

        if let Some(task) = self.store.get(&task_id) {
            info!(
                task_id = %task_id,
                status = %task.status,
                message = %task.message,
                "Task finished"
            );
        }
    }

    /// Spawn the primary transcoder and follow it until it exits.
    ///
    /// Returns `None` when the process never started (already recorded).
    async fn run_primary(&self, transcoder: &Transcoder, task: &Task) -> Option<TaskEvent> {
        let task_id = task.id.as_str();
        let args = primary_args(&task.source_url, &task.temp_file);
        debug!(task_id, binary = %transcoder.binary_path, ?args, "Spawning transcoder");

        let spawned = process_utils::tokio_command(&transcoder.binary_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let err = Error::spawn(&transcoder.binary_path, e);
                error!(task_id, error = %err, "Failed to start transcoder");
                self.dispatch(task_id, TaskEvent::SpawnFailed(client_message(&err)));
                return None;
            }
        };

        let handle = ProcessHandle::new(child.id());
        let cancel = handle.cancel.clone();
        info!(task_id, pid = ?handle.pid, "Transcoder started");
        self.dispatch(task_id, TaskEvent::Spawned(handle));

        let status = self.follow(task_id, &mut child, &cancel).await;
        Some(match status {
            Ok(status) => {
                if status.success() {
                    debug!(task_id, "Transcoder exited cleanly");
                } else {
                    warn!(task_id, %status, "Transcoder exited with failure");
                }
                TaskEvent::Exited(status.code())
            }
            Err(e) => {
                error!(task_id, error = %e, "Error waiting for transcoder");
                TaskEvent::Failed(format!("Lost track of the transcoder: {e}"))
            }
        })
    }

    /// Pump the diagnostic stream into progress events until the child exits,
    /// interrupting it when the task's token fires.
    async fn follow(
        &self,
        task_id: &str,
        child: &mut Child,
        cancel: &CancellationToken,
    ) -> std::io::Result<ExitStatus> {
        let mut lines = child.stderr.take().map(|s| BufReader::new(s).lines());
        let mut tracker = ProgressTracker::new();
        let mut interrupted = false;
        let mut killed = false;
        let kill_deadline = tokio::time::sleep(INTERRUPT_GRACE);
        tokio::pin!(kill_deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled(), if !interrupted => {
                    interrupted = true;
                    if let Err(e) = process_utils::interrupt(child) {
                        warn!(task_id, error = %e, "Failed to interrupt transcoder");
                    }
                    kill_deadline
                        .as_mut()
                        .reset(tokio::time::Instant::now() + INTERRUPT_GRACE);
                }
                _ = &mut kill_deadline, if interrupted && !killed => {
                    killed = true;
                    warn!(task_id, "Transcoder ignored the interrupt, killing it");
                    if let Err(e) = child.start_kill() {
                        warn!(task_id, error = %e, "Failed to kill transcoder");
                    }
                }
                line = next_line(lines.as_mut()), if lines.is_some() => match line {
                    Ok(Some(line)) => self.observe_line(task_id, &mut tracker, &line),
                    Ok(None) => lines = None,
                    Err(e) => {
                        warn!(task_id, error = %e, "Error reading transcoder output");
                        lines = None;
                    }
                },
                status = child.wait(), if lines.is_none() => return status,
            }
        }
    }

    fn observe_line(&self, task_id: &str, tracker: &mut ProgressTracker, line: &str) {
        if let Some(percent) = tracker.observe(line) {
            self.dispatch(task_id, TaskEvent::Progress(percent));
        } else if parser::is_progress_end(line) {
            debug!(task_id, "Transcoder reported end of progress");
        } else if line.to_ascii_lowercase().contains("error") {
            warn!(task_id, "transcoder: {}", line);
        } else {
            trace!(task_id, "transcoder: {}", line);
        }
    }

    /// Download directly when no transcoder is installed.
    async fn run_fallback(&self, task: &Task) -> Option<TaskEvent> {
        let task_id = task.id.as_str();
        let handle = ProcessHandle::new(None);
        let cancel = handle.cancel.clone();
        self.dispatch(task_id, TaskEvent::Spawned(handle));
        info!(task_id, "No transcoder available, downloading directly");

        let result = self
            .fallback
            .fetch(&task.source_url, &task.temp_file, &cancel, |percent| {
                self.dispatch(
                    task_id,
                    TaskEvent::Progress(percent.min(parser::HEARTBEAT_CAP)),
                );
            })
            .await;

        Some(match result {
            Ok(FetchOutcome::Completed) => TaskEvent::Exited(Some(0)),
            Ok(FetchOutcome::Cancelled) => TaskEvent::Exited(None),
            Err(e) => {
                warn!(task_id, error = %e, "Fallback download failed");
                TaskEvent::Failed(format!("Download failed: {}", client_message(&e)))
            }
        })
    }

    async fn execute(&self, task_id: &str, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Interrupt(token) => token.cancel(),
            Effect::Rename { temp, out } => {
                let event = match move_file(&temp, &out).await {
                    Ok(()) => TaskEvent::Finalized,
                    Err(e) => {
                        error!(task_id, error = %e, "Failed to move output into place");
                        TaskEvent::Failed(
                            Error::Finalize("could not move the output into place".into())
                                .to_string(),
                        )
                    }
                };
                self.dispatch(task_id, event);
            }
            Effect::Remux { temp, out } => {
                info!(task_id, from = %temp.display(), to = %out.display(), "Remuxing");
                let event = match self.remux(&temp, &out).await {
                    Ok(()) => {
                        if let Err(e) = remove_file_if_exists(&temp).await {
                            warn!(task_id, error = %e, "Failed to remove temp file after remux");
                        }
                        TaskEvent::Finalized
                    }
                    Err(e) => {
                        error!(task_id, error = %e, "Remux failed");
                        TaskEvent::Failed(format!("Finalize failed: {}", client_message(&e)))
                    }
                };
                self.dispatch(task_id, event);
            }
            Effect::DiscardTemp(temp) => match remove_file_if_exists(&temp).await {
                Ok(()) => debug!(task_id, file = %temp.display(), "Discarded temp file"),
                Err(e) => warn!(task_id, error = %e, "Failed to discard temp file"),
            },
        }
    }

    async fn remux(&self, temp: &Path, out: &Path) -> Result<()> {
        let Some(transcoder) = &self.transcoder else {
            return Err(Error::Finalize(
                "a different container was requested but no transcoder is available".into(),
            ));
        };

        let output = process_utils::tokio_command(&transcoder.binary_path)
            .args(remux_args(temp, out))
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::spawn(&transcoder.binary_path, e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(last) = stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            warn!(binary = %transcoder.binary_path, "remux: {}", last);
        }
        if let Err(e) = remove_file_if_exists(out).await {
            warn!(error = %e, "Failed to remove partial remux output");
        }
        Err(Error::Exit {
            program: "Remux".to_string(),
            code: output.status.code().unwrap_or(-1),
        })
    }

    /// Feed an event to the store, logging instead of failing when the task
    /// is gone.
    fn dispatch(&self, task_id: &str, event: TaskEvent) -> Effect {
        match self.store.apply(task_id, event) {
            Ok(effect) => effect,
            Err(e) => {
                warn!(task_id, error = %e, "Dropping task event");
                Effect::None
            }
        }
    }
}

async fn next_line(
    lines: Option<&mut Lines<BufReader<ChildStderr>>>,
) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => Ok(None),
    }
}

/// Client-facing description of an error. Paths (binary, temp and output
/// files) stay in the logs.
fn client_message(err: &Error) -> String {
    match err {
        Error::Spawn { .. } => "could not start the transcoder".to_string(),
        Error::Exit { program, code } => format!("{program} exited with code {code}"),
        Error::Http(e) => match e.status() {
            Some(status) => format!("server answered {status}"),
            None if e.is_timeout() => "request timed out".to_string(),
            None => "could not reach the server".to_string(),
        },
        Error::Io(_) | Error::IoPath { .. } => "could not write the output file".to_string(),
        Error::Validation(message) | Error::Finalize(message) | Error::Other(message) => {
            message.clone()
        }
        _ => "internal error".to_string(),
    }
}

/// Trimmed `raw` if it is an absolute http(s) URL.
pub fn validate_url(raw: &str) -> Result<&str> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(Error::validation("url is required"));
    }
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(url),
        _ => Err(Error::validation("url must be an absolute http(s) URL")),
    }
}
