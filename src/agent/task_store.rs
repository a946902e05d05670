// ManimGen Task Store
// Copyright (c) 2026 ManimGen
//
// In-memory bookkeeping for generation requests. Tasks live for the life of
// the process and are never removed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// pending -> processing -> {completed, failed}. A pending task may also
    /// fail directly when the pipeline dies before producing code.
    pub fn can_move_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status payload returned by `/status/:task_id` and `/generate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub code: Option<String>,
    pub video_url: Option<String>,
    pub error: Option<String>,
}

impl GenerationTask {
    fn new(task_id: String) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            code: None,
            video_url: None,
            error: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<String, GenerationTask>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending task and return its id.
    pub fn create(&self) -> GenerationTask {
        let task = GenerationTask::new(Uuid::new_v4().to_string());
        self.lock().insert(task.task_id.clone(), task.clone());
        info!("[TASKS] Created task {}", task.task_id);
        task
    }

    pub fn get(&self, task_id: &str) -> Option<GenerationTask> {
        self.lock().get(task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn count_active(&self) -> usize {
        self.lock()
            .values()
            .filter(|t| !t.status.is_terminal())
            .count()
    }

    pub fn mark_processing(&self, task_id: &str, code: &str) -> Result<GenerationTask> {
        self.transition(task_id, TaskStatus::Processing, |t| {
            t.code = Some(code.to_string());
        })
    }

    pub fn complete(&self, task_id: &str, video_url: &str) -> Result<GenerationTask> {
        self.transition(task_id, TaskStatus::Completed, |t| {
            t.video_url = Some(video_url.to_string());
        })
    }

    pub fn fail(&self, task_id: &str, error: &str) -> Result<GenerationTask> {
        self.transition(task_id, TaskStatus::Failed, |t| {
            t.error = Some(error.to_string());
        })
    }

    fn transition<F>(&self, task_id: &str, next: TaskStatus, apply: F) -> Result<GenerationTask>
    where
        F: FnOnce(&mut GenerationTask),
    {
        let mut tasks = self.lock();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::NotFound("Task not found".to_string()))?;

        if !task.status.can_move_to(next) {
            warn!(
                "[TASKS] Rejected transition for {}: {} -> {}",
                task_id, task.status, next
            );
            return Err(Error::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: next,
            });
        }

        task.status = next;
        apply(task);
        Ok(task.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, GenerationTask>> {
        // A panic while holding the lock leaves the map itself intact.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let store = TaskStore::new();
        let task = store.create();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.code.is_none());

        store.mark_processing(&task.task_id, "from manim import *").unwrap();
        let done = store.complete(&task.task_id, "/videos/x/animation.mp4").unwrap();

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.code.as_deref(), Some("from manim import *"));
        assert_eq!(done.video_url.as_deref(), Some("/videos/x/animation.mp4"));
        assert!(done.error.is_none());
    }

    #[test]
    fn test_pending_can_fail_directly() {
        let store = TaskStore::new();
        let task = store.create();
        let failed = store.fail(&task.task_id, "llm exploded").unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("llm exploded"));
    }

    #[test]
    fn test_status_never_regresses() {
        let store = TaskStore::new();
        let task = store.create();
        store.mark_processing(&task.task_id, "code").unwrap();
        store.fail(&task.task_id, "render failed").unwrap();

        assert!(store.mark_processing(&task.task_id, "again").is_err());
        assert!(store.complete(&task.task_id, "/videos/late.mp4").is_err());

        let after = store.get(&task.task_id).unwrap();
        assert_eq!(after.status, TaskStatus::Failed);
        assert!(after.video_url.is_none());
        assert_eq!(after.code.as_deref(), Some("code"));
    }

    #[test]
    fn test_cannot_complete_without_processing() {
        let store = TaskStore::new();
        let task = store.create();
        let err = store.complete(&task.task_id, "/videos/a.mp4").unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(store.get(&task.task_id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_unknown_task() {
        let store = TaskStore::new();
        assert!(store.get("missing").is_none());
        assert!(matches!(store.fail("missing", "x"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_transition_table() {
        use TaskStatus::*;
        let all = [Pending, Processing, Completed, Failed];
        for from in all {
            for to in all {
                let allowed = from.can_move_to(to);
                if from.is_terminal() || from == to {
                    assert!(!allowed, "{} -> {} must be rejected", from, to);
                }
            }
        }
        assert!(!Processing.can_move_to(Pending));
    }

    #[test]
    fn test_active_count() {
        let store = TaskStore::new();
        let a = store.create();
        let _b = store.create();
        store.fail(&a.task_id, "x").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.count_active(), 1);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
