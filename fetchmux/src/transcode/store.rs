//! In-memory task registry.

use dashmap::DashMap;

use super::machine::{self, Effect, TaskEvent};
use super::task::Task;
use crate::{Error, Result};

/// Task id → task state. The only source of truth while tasks are alive;
/// nothing survives a restart.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: DashMap<String, Task>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and return its id.
    pub fn create(&self, task: Task) -> String {
        let id = task.id.clone();
        self.tasks.insert(id.clone(), task);
        id
    }

    /// Snapshot of a task.
    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    /// Run `f` on a task under its entry lock.
    pub fn update<F, R>(&self, id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Task) -> R,
    {
        let mut entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Task", id))?;
        Ok(f(entry.value_mut()))
    }

    /// Feed one event through the reducer, atomically for that task.
    pub fn apply(&self, id: &str, event: TaskEvent) -> Result<Effect> {
        let mut entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Task", id))?;
        machine::reduce(entry.value_mut(), event)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::task::{ProcessHandle, TaskStatus};
    use std::path::PathBuf;

    fn sample() -> Task {
        Task::new(
            "https://x/a.mp4",
            PathBuf::from("/d/a_tmp.mp4"),
            PathBuf::from("/d/a.mp4"),
            "mp4",
        )
    }

    #[test]
    fn test_create_and_get() {
        let store = TaskStore::new();
        let id = store.create(sample());

        let task = store.get(&id).unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let store = TaskStore::new();
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| store.create(sample())).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_unknown_id() {
        let store = TaskStore::new();
        assert!(store.get("missing").is_none());
        assert!(matches!(
            store.apply("missing", TaskEvent::CancelRequested),
            Err(Error::NotFound { .. })
        ));
        assert!(store.update("missing", |_| ()).is_err());
    }

    #[test]
    fn test_apply_runs_reducer() {
        let store = TaskStore::new();
        let id = store.create(sample());

        store
            .apply(&id, TaskEvent::Spawned(ProcessHandle::new(Some(1))))
            .unwrap();
        store.apply(&id, TaskEvent::Progress(33)).unwrap();

        let task = store.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, 33);
    }

    #[test]
    fn test_update() {
        let store = TaskStore::new();
        let id = store.create(sample());

        store.update(&id, |t| t.message = "custom".into()).unwrap();
        assert_eq!(store.get(&id).unwrap().message, "custom");
        assert_eq!(store.len(), 1);
    }
}
