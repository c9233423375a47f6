//! Task lifecycle as a pure reducer.
//!
//! Every observation about a task (spawned, progress, exited, ...) is a
//! [`TaskEvent`]. [`reduce`] applies it to the task and returns the
//! [`Effect`] the supervisor has to carry out next. The store runs the reducer
//! under the task's entry lock, so events for one task never interleave.
//!
//! Terminal tasks swallow every event. In particular, the exit of a process
//! that was interrupted by a cancel arrives after the task is already
//! `cancelled` and cannot turn it into `done` or `error`.

use std::path::PathBuf;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::paths;
use super::task::{ProcessHandle, Task, TaskStatus};
use crate::{Error, Result};

/// Progress reported while the finalize step runs.
pub const FINALIZING_PROGRESS: u8 = 95;

/// Something that happened to a task.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The primary subprocess is running.
    Spawned(ProcessHandle),
    /// The primary subprocess could not be started.
    SpawnFailed(String),
    /// The diagnostic stream moved progress to this percentage.
    Progress(u8),
    /// The primary subprocess exited. `None` means killed by a signal.
    Exited(Option<i32>),
    /// A client asked to stop the task.
    CancelRequested,
    /// Rename or remux produced the output file.
    Finalized,
    /// Rename, remux or a fetch step failed.
    Failed(String),
}

/// Follow-up work for the supervisor.
#[derive(Debug, Clone)]
pub enum Effect {
    None,
    /// Interrupt the live subprocess.
    Interrupt(CancellationToken),
    /// Move the temp file into place.
    Rename { temp: PathBuf, out: PathBuf },
    /// Copy-remux the temp file into the output container.
    Remux { temp: PathBuf, out: PathBuf },
    /// Remove a transient file that will never be finalized.
    DiscardTemp(PathBuf),
}

/// Apply `event` to `task`.
///
/// Only a rejected cancel is an error; every other event that does not fit
/// the current status is ignored and yields [`Effect::None`].
pub fn reduce(task: &mut Task, event: TaskEvent) -> Result<Effect> {
    if task.status.is_terminal() {
        return reduce_terminal(task, event);
    }

    let effect = match (task.status, event) {
        (TaskStatus::Pending, TaskEvent::Spawned(handle)) => {
            task.status = TaskStatus::Running;
            task.message = "Downloading".to_string();
            task.process = Some(handle);
            Effect::None
        }
        (TaskStatus::Pending, TaskEvent::SpawnFailed(message)) => {
            fail(task, message);
            Effect::None
        }
        (TaskStatus::Running, TaskEvent::Progress(percent)) => {
            let percent = percent.min(100);
            if percent > task.progress {
                task.progress = percent;
                task.message = format!("Downloading {percent}%");
            }
            Effect::None
        }
        (TaskStatus::Running, TaskEvent::Exited(Some(0))) => {
            task.process = None;
            task.status = TaskStatus::Finalizing;
            task.progress = task.progress.max(FINALIZING_PROGRESS);
            task.message = "Finalizing".to_string();
            finalize_effect(task)
        }
        (TaskStatus::Running, TaskEvent::Exited(code)) => {
            let message = match code {
                Some(code) => Error::Exit {
                    program: "Transcoder".to_string(),
                    code,
                }
                .to_string(),
                None => "Transcoder was terminated by a signal".to_string(),
            };
            fail(task, message);
            Effect::None
        }
        (TaskStatus::Running, TaskEvent::CancelRequested) => {
            let Some(handle) = task.process.take() else {
                return Err(Error::cancel_precondition(&task.id, "no live process"));
            };
            task.status = TaskStatus::Cancelled;
            task.message = "Cancelled".to_string();
            Effect::Interrupt(handle.cancel)
        }
        (status, TaskEvent::CancelRequested) => {
            return Err(Error::cancel_precondition(
                &task.id,
                format!("task is {status}"),
            ));
        }
        (TaskStatus::Running, TaskEvent::Failed(message))
        | (TaskStatus::Finalizing, TaskEvent::Failed(message)) => {
            fail(task, message);
            Effect::None
        }
        (TaskStatus::Finalizing, TaskEvent::Finalized) => {
            task.status = TaskStatus::Done;
            task.progress = 100;
            task.message = "Done".to_string();
            Effect::None
        }
        // Out-of-order event for a live task.
        _ => return Ok(Effect::None),
    };

    task.updated_at = Utc::now();
    Ok(effect)
}

fn reduce_terminal(task: &mut Task, event: TaskEvent) -> Result<Effect> {
    match event {
        TaskEvent::CancelRequested => Err(Error::cancel_precondition(
            &task.id,
            format!("task is {}", task.status),
        )),
        // The interrupted process finally went away; its partial output is
        // of no use.
        TaskEvent::Exited(_) if task.status == TaskStatus::Cancelled => {
            task.process = None;
            Ok(Effect::DiscardTemp(task.temp_file.clone()))
        }
        _ => Ok(Effect::None),
    }
}

fn fail(task: &mut Task, message: String) {
    task.process = None;
    task.status = TaskStatus::Error;
    task.message = message;
}

/// Rename when the temp file already has the output container, remux otherwise.
fn finalize_effect(task: &Task) -> Effect {
    let temp = task.temp_file.clone();
    let out = task.out_file.clone();
    let temp_ext = paths::extension_of(&temp);
    if temp_ext.as_deref() == Some(task.output_format.to_ascii_lowercase().as_str()) {
        Effect::Rename { temp, out }
    } else {
        Effect::Remux { temp, out }
    }
}
