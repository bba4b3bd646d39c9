//! Worker callback state machine.
//!
//! Each callback maps to exactly one atomic store operation. Transitions
//! other than `ready` only touch the running task bound to the calling
//! worker; a callback from a worker that no longer holds a task (late
//! heartbeat after preemption, duplicate outcome) changes nothing.

use spotline_core::protocol::{CallbackForm, CallbackResponse, CallbackState};
use spotline_db::store::{StoreResult, TaskStore};

/// Apply one callback from `form.worker_id` for tasks of `kind`.
///
/// Only a committed `ready` claim yields a command; any store error is
/// returned so the caller can answer with a retryable status.
pub async fn apply(
    store: &dyn TaskStore,
    kind: &str,
    form: &CallbackForm,
    max_attempts: i16,
) -> StoreResult<CallbackResponse> {
    let worker_id = form.worker_id.as_str();

    let changed = match form.state {
        CallbackState::Ready => {
            return match store.claim_next(kind, worker_id, max_attempts).await? {
                Some(task) => {
                    tracing::info!(
                        task_id = task.id,
                        worker_id,
                        kind,
                        attempts = task.attempts,
                        "Task claimed by worker",
                    );
                    Ok(CallbackResponse::with_command(task.command))
                }
                None => {
                    tracing::info!(worker_id, kind, "No queued task for worker");
                    Ok(CallbackResponse::empty())
                }
            };
        }
        CallbackState::Running => {
            let activity = form.activity.as_deref().unwrap_or_default();
            store.heartbeat(worker_id, activity).await?
        }
        CallbackState::Terminated => {
            let released = store.release(worker_id).await?;
            for task in &released {
                tracing::info!(
                    task_id = task.id,
                    worker_id,
                    "Worker preempted, task requeued",
                );
            }
            released
        }
        CallbackState::Failed => {
            let failed = store.fail(worker_id, max_attempts).await?;
            for task in &failed {
                tracing::warn!(
                    task_id = task.id,
                    worker_id,
                    attempts = task.attempts,
                    status = ?task.status(),
                    "Task attempt failed",
                );
            }
            failed
        }
        CallbackState::Completed => {
            let completed = store.complete(worker_id).await?;
            for task in &completed {
                tracing::info!(task_id = task.id, worker_id, "Task completed");
            }
            completed
        }
    };

    if changed.is_empty() {
        tracing::debug!(
            worker_id,
            state = %form.state,
            "Callback from worker without a running task ignored",
        );
    }

    Ok(CallbackResponse::empty())
}
