//! Repository for the `tasks` table.
//!
//! Every lifecycle transition is a single `UPDATE ... RETURNING` statement
//! filtered by the bound worker (callback path) or by the worker id read
//! during the reclaim scan, so concurrent writers never clobber each other.

use sqlx::PgPool;
use spotline_core::dispatch::INITIAL_ACTIVITY;
use spotline_core::types::{DbId, Timestamp};

use crate::models::status::TaskStatus;
use crate::models::task::{SubmitTask, Task, TaskListQuery};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, kind, command, callback_url, status_id, worker_id, activity, attempts, \
    created_at, started_at, last_heartbeat_at, completed_at";

/// `SET` clause for the retry-or-fail transition.
///
/// Expressions on the right-hand side see the row *before* the update, so
/// the branch is chosen on the pre-increment attempt count. `max_param` is
/// the bind placeholder holding `max_attempts`.
fn failure_assignments(max_param: &str) -> String {
    let queued = TaskStatus::Queued.id();
    let failed = TaskStatus::Failed.id();
    format!(
        "status_id = CASE WHEN attempts < {max_param} THEN {queued} ELSE {failed} END, \
         attempts = CASE WHEN attempts < {max_param} THEN attempts + 1 ELSE attempts END, \
         worker_id = NULL, \
         activity = CASE WHEN attempts < {max_param} THEN '' ELSE activity END, \
         started_at = CASE WHEN attempts < {max_param} THEN NULL ELSE started_at END, \
         last_heartbeat_at = CASE WHEN attempts < {max_param} THEN NULL ELSE last_heartbeat_at END, \
         completed_at = CASE WHEN attempts < {max_param} THEN NULL ELSE NOW() END"
    )
}

/// Provides lifecycle operations for dispatchable tasks.
pub struct TaskRepo;

impl TaskRepo {
    // ── Submission / reads ──────────────────────────────────────────────

    /// Insert a new queued task with zero attempts.
    pub async fn submit(pool: &PgPool, input: &SubmitTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (kind, command, callback_url, status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.kind)
            .bind(&input.command)
            .bind(&input.callback_url)
            .bind(TaskStatus::Queued.id())
            .fetch_one(pool)
            .await
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List tasks, newest first, with optional kind/status filters.
    pub async fn list(pool: &PgPool, params: &TaskListQuery) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE ($1::TEXT IS NULL OR kind = $1) \
               AND ($2::SMALLINT IS NULL OR status_id = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(params.kind.as_deref())
            .bind(params.status_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
    }

    // ── Callback transitions ────────────────────────────────────────────

    /// Atomically claim the oldest queued task of `kind` for `worker_id`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent `ready` calls
    /// never receive the same row. Any task still bound to the caller is
    /// first put through the failure transition in the same transaction:
    /// a worker asking for new work has abandoned its previous task.
    pub async fn claim_next(
        pool: &PgPool,
        kind: &str,
        worker_id: &str,
        max_attempts: i16,
    ) -> Result<Option<Task>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let abandoned = Self::fail_bound(&mut *tx, worker_id, max_attempts).await?;
        for task in &abandoned {
            tracing::warn!(
                task_id = task.id,
                worker_id,
                attempts = task.attempts,
                "Worker asked for new work while still bound; previous task failed",
            );
        }

        let query = format!(
            "UPDATE tasks \
             SET status_id = $1, worker_id = $2, activity = $3, \
                 started_at = NOW(), last_heartbeat_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE status_id = $4 AND kind = $5 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Running.id())
            .bind(worker_id)
            .bind(INITIAL_ACTIVITY)
            .bind(TaskStatus::Queued.id())
            .bind(kind)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(claimed)
    }

    /// Record a heartbeat and progress description for the caller's task.
    pub async fn heartbeat(
        pool: &PgPool,
        worker_id: &str,
        activity: &str,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET activity = $2, last_heartbeat_at = NOW() \
             WHERE worker_id = $1 AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(worker_id)
            .bind(activity)
            .bind(TaskStatus::Running.id())
            .fetch_all(pool)
            .await
    }

    /// Return the caller's task to the queue without counting an attempt
    /// (the instance was preempted).
    pub async fn release(pool: &PgPool, worker_id: &str) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $2, worker_id = NULL, activity = '', \
                 started_at = NULL, last_heartbeat_at = NULL \
             WHERE worker_id = $1 AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(worker_id)
            .bind(TaskStatus::Queued.id())
            .bind(TaskStatus::Running.id())
            .fetch_all(pool)
            .await
    }

    /// Apply the retry-or-fail transition to the caller's task.
    pub async fn fail(
        pool: &PgPool,
        worker_id: &str,
        max_attempts: i16,
    ) -> Result<Vec<Task>, sqlx::Error> {
        Self::fail_bound(pool, worker_id, max_attempts).await
    }

    /// Mark the caller's task completed and unbind it.
    pub async fn complete(pool: &PgPool, worker_id: &str) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $2, worker_id = NULL, completed_at = NOW() \
             WHERE worker_id = $1 AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(worker_id)
            .bind(TaskStatus::Completed.id())
            .bind(TaskStatus::Running.id())
            .fetch_all(pool)
            .await
    }

    async fn fail_bound<'e, E>(
        executor: E,
        worker_id: &str,
        max_attempts: i16,
    ) -> Result<Vec<Task>, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE tasks SET {} \
             WHERE worker_id = $1 AND status_id = $3 \
             RETURNING {COLUMNS}",
            failure_assignments("$2"),
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(worker_id)
            .bind(max_attempts)
            .bind(TaskStatus::Running.id())
            .fetch_all(executor)
            .await
    }

    // ── Scheduler scans ─────────────────────────────────────────────────

    /// Queued tasks of `kind` that fall within the provisioning window.
    ///
    /// The window holds up to `limit` queued or running tasks, running first
    /// and then oldest first; the queued rows inside it each need an
    /// instance.
    pub async fn provision_window(
        pool: &PgPool,
        kind: &str,
        limit: i64,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "WITH relevant AS ( \
                 SELECT {COLUMNS} FROM tasks \
                 WHERE kind = $1 AND status_id IN ($2, $3) \
                 ORDER BY (status_id <> $3), created_at ASC, id ASC \
                 LIMIT $4 \
             ) \
             SELECT {COLUMNS} FROM relevant \
             WHERE status_id = $2 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(kind)
            .bind(TaskStatus::Queued.id())
            .bind(TaskStatus::Running.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Running tasks whose last heartbeat is older than `cutoff`.
    pub async fn find_stale(pool: &PgPool, cutoff: Timestamp) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE status_id = $1 AND last_heartbeat_at < $2 \
             ORDER BY last_heartbeat_at ASC"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Running.id())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// Apply the retry-or-fail transition to a hung task.
    ///
    /// Only succeeds if the task is still running and still bound to
    /// `worker_id`, the value read by the stale scan. Returns `None` when a
    /// callback changed the row in the meantime.
    pub async fn reclaim(
        pool: &PgPool,
        task_id: DbId,
        worker_id: &str,
        max_attempts: i16,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET {} \
             WHERE id = $1 AND worker_id = $3 AND status_id = $4 \
             RETURNING {COLUMNS}",
            failure_assignments("$2"),
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(max_attempts)
            .bind(worker_id)
            .bind(TaskStatus::Running.id())
            .fetch_optional(pool)
            .await
    }
}
