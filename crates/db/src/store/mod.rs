//! Task store abstraction.
//!
//! The callback state machine and the scheduler program against
//! [`TaskStore`]. [`PgTaskStore`] delegates to [`TaskRepo`](crate::repositories::TaskRepo);
//! [`MemoryTaskStore`] keeps rows behind a single mutex, which gives it the
//! same claim-once guarantee as `FOR UPDATE SKIP LOCKED`.

use async_trait::async_trait;
use spotline_core::types::{DbId, Timestamp};

use crate::models::task::{SubmitTask, Task, TaskListQuery};

pub mod memory;
pub mod postgres;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

/// Errors surfaced by a task store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic task lifecycle primitives.
///
/// Worker-scoped transitions (`heartbeat`, `release`, `fail`, `complete`)
/// only touch running tasks bound to `worker_id` and return the rows they
/// changed; an empty vector means the call was a no-op.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Verify the backing store is reachable.
    async fn health_check(&self) -> StoreResult<()>;

    /// Insert a new queued task with zero attempts.
    async fn submit(&self, input: &SubmitTask) -> StoreResult<Task>;

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Task>>;

    async fn list(&self, params: &TaskListQuery) -> StoreResult<Vec<Task>>;

    /// Claim the oldest queued task of `kind` for `worker_id`. At most one
    /// caller ever receives a given row.
    async fn claim_next(
        &self,
        kind: &str,
        worker_id: &str,
        max_attempts: i16,
    ) -> StoreResult<Option<Task>>;

    async fn heartbeat(&self, worker_id: &str, activity: &str) -> StoreResult<Vec<Task>>;

    /// Requeue without counting an attempt.
    async fn release(&self, worker_id: &str) -> StoreResult<Vec<Task>>;

    /// Retry-or-fail transition for a worker-reported failure.
    async fn fail(&self, worker_id: &str, max_attempts: i16) -> StoreResult<Vec<Task>>;

    async fn complete(&self, worker_id: &str) -> StoreResult<Vec<Task>>;

    /// Queued tasks inside the provisioning window of `limit` active tasks.
    async fn provision_window(&self, kind: &str, limit: i64) -> StoreResult<Vec<Task>>;

    /// Running tasks with a heartbeat older than `cutoff`.
    async fn find_stale(&self, cutoff: Timestamp) -> StoreResult<Vec<Task>>;

    /// Retry-or-fail transition for a hung task, applied only if it is still
    /// running and bound to `worker_id`.
    async fn reclaim(
        &self,
        task_id: DbId,
        worker_id: &str,
        max_attempts: i16,
    ) -> StoreResult<Option<Task>>;
}
