//! In-memory task store for tests and local runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use spotline_core::dispatch::{failure_outcome, FailureOutcome, INITIAL_ACTIVITY};
use spotline_core::types::{DbId, Timestamp};
use tokio::sync::Mutex;

use super::{StoreResult, TaskStore};
use crate::models::status::TaskStatus;
use crate::models::task::{SubmitTask, Task, TaskListQuery};

#[derive(Default)]
struct MemoryState {
    next_id: DbId,
    tasks: BTreeMap<DbId, Task>,
}

impl MemoryState {
    fn running_for<'a>(&'a mut self, worker_id: &'a str) -> impl Iterator<Item = &'a mut Task> {
        self.tasks.values_mut().filter(move |t| {
            t.is(TaskStatus::Running) && t.worker_id.as_deref() == Some(worker_id)
        })
    }
}

/// Apply the retry-or-fail transition to a single row.
fn apply_failure(task: &mut Task, max_attempts: i16, now: Timestamp) {
    match failure_outcome(task.attempts, max_attempts) {
        FailureOutcome::Requeue { attempts } => {
            task.status_id = TaskStatus::Queued.id();
            task.attempts = attempts;
            task.worker_id = None;
            task.activity.clear();
            task.started_at = None;
            task.last_heartbeat_at = None;
            task.completed_at = None;
        }
        FailureOutcome::Fail { attempts } => {
            task.status_id = TaskStatus::Failed.id();
            task.attempts = attempts;
            task.worker_id = None;
            task.completed_at = Some(now);
        }
    }
}

/// [`TaskStore`] that keeps every row in a `BTreeMap` behind one mutex.
///
/// Cloning shares the underlying rows.
#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every task, ordered by id.
    pub async fn all(&self) -> Vec<Task> {
        self.state.lock().await.tasks.values().cloned().collect()
    }

    /// Overwrite a task's heartbeat timestamp. Returns `false` if the task
    /// does not exist.
    pub async fn set_last_heartbeat(&self, id: DbId, at: Option<Timestamp>) -> bool {
        match self.state.lock().await.tasks.get_mut(&id) {
            Some(task) => {
                task.last_heartbeat_at = at;
                true
            }
            None => false,
        }
    }

    /// Overwrite a task's attempt counter. Returns `false` if the task does
    /// not exist.
    pub async fn set_attempts(&self, id: DbId, attempts: i16) -> bool {
        match self.state.lock().await.tasks.get_mut(&id) {
            Some(task) => {
                task.attempts = attempts;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn submit(&self, input: &SubmitTask) -> StoreResult<Task> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let task = Task {
            id: state.next_id,
            kind: input.kind.clone(),
            command: input.command.clone(),
            callback_url: input.callback_url.clone(),
            status_id: TaskStatus::Queued.id(),
            worker_id: None,
            activity: String::new(),
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            last_heartbeat_at: None,
            completed_at: None,
        };
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Task>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn list(&self, params: &TaskListQuery) -> StoreResult<Vec<Task>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| params.kind.as_deref().map_or(true, |k| t.kind == k))
            .filter(|t| params.status_id.map_or(true, |s| t.status_id == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tasks
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect())
    }

    async fn claim_next(
        &self,
        kind: &str,
        worker_id: &str,
        max_attempts: i16,
    ) -> StoreResult<Option<Task>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        for task in state.running_for(worker_id) {
            tracing::warn!(
                task_id = task.id,
                worker_id,
                "Worker asked for new work while still bound; previous task failed",
            );
            apply_failure(task, max_attempts, now);
        }

        let next = state
            .tasks
            .values_mut()
            .filter(|t| t.is(TaskStatus::Queued) && t.kind == kind)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(next.map(|task| {
            task.status_id = TaskStatus::Running.id();
            task.worker_id = Some(worker_id.to_string());
            task.activity = INITIAL_ACTIVITY.to_string();
            task.started_at = Some(now);
            task.last_heartbeat_at = Some(now);
            task.clone()
        }))
    }

    async fn heartbeat(&self, worker_id: &str, activity: &str) -> StoreResult<Vec<Task>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        Ok(state
            .running_for(worker_id)
            .map(|task| {
                task.activity = activity.to_string();
                task.last_heartbeat_at = Some(now);
                task.clone()
            })
            .collect())
    }

    async fn release(&self, worker_id: &str) -> StoreResult<Vec<Task>> {
        let mut state = self.state.lock().await;
        Ok(state
            .running_for(worker_id)
            .map(|task| {
                task.status_id = TaskStatus::Queued.id();
                task.worker_id = None;
                task.activity.clear();
                task.started_at = None;
                task.last_heartbeat_at = None;
                task.clone()
            })
            .collect())
    }

    async fn fail(&self, worker_id: &str, max_attempts: i16) -> StoreResult<Vec<Task>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        Ok(state
            .running_for(worker_id)
            .map(|task| {
                apply_failure(task, max_attempts, now);
                task.clone()
            })
            .collect())
    }

    async fn complete(&self, worker_id: &str) -> StoreResult<Vec<Task>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        Ok(state
            .running_for(worker_id)
            .map(|task| {
                task.status_id = TaskStatus::Completed.id();
                task.worker_id = None;
                task.completed_at = Some(now);
                task.clone()
            })
            .collect())
    }

    async fn provision_window(&self, kind: &str, limit: i64) -> StoreResult<Vec<Task>> {
        let state = self.state.lock().await;
        let mut active: Vec<&Task> = state
            .tasks
            .values()
            .filter(|t| t.kind == kind && (t.is(TaskStatus::Queued) || t.is(TaskStatus::Running)))
            .collect();
        active.sort_by(|a, b| {
            let a_queued = !a.is(TaskStatus::Running);
            let b_queued = !b.is(TaskStatus::Running);
            a_queued
                .cmp(&b_queued)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(active
            .into_iter()
            .take(limit.max(0) as usize)
            .filter(|t| t.is(TaskStatus::Queued))
            .cloned()
            .collect())
    }

    async fn find_stale(&self, cutoff: Timestamp) -> StoreResult<Vec<Task>> {
        let state = self.state.lock().await;
        let mut stale: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| {
                t.is(TaskStatus::Running) && t.last_heartbeat_at.is_some_and(|hb| hb < cutoff)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.last_heartbeat_at);
        Ok(stale)
    }

    async fn reclaim(
        &self,
        task_id: DbId,
        worker_id: &str,
        max_attempts: i16,
    ) -> StoreResult<Option<Task>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        Ok(state
            .tasks
            .get_mut(&task_id)
            .filter(|t| t.is(TaskStatus::Running) && t.worker_id.as_deref() == Some(worker_id))
            .map(|task| {
                apply_failure(task, max_attempts, now);
                task.clone()
            }))
    }
}
