//! Postgres-backed task store.

use async_trait::async_trait;
use spotline_core::types::{DbId, Timestamp};

use super::{StoreResult, TaskStore};
use crate::models::task::{SubmitTask, Task, TaskListQuery};
use crate::repositories::TaskRepo;
use crate::DbPool;

/// [`TaskStore`] over a Postgres connection pool.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn health_check(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn submit(&self, input: &SubmitTask) -> StoreResult<Task> {
        Ok(TaskRepo::submit(&self.pool, input).await?)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list(&self, params: &TaskListQuery) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::list(&self.pool, params).await?)
    }

    async fn claim_next(
        &self,
        kind: &str,
        worker_id: &str,
        max_attempts: i16,
    ) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::claim_next(&self.pool, kind, worker_id, max_attempts).await?)
    }

    async fn heartbeat(&self, worker_id: &str, activity: &str) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::heartbeat(&self.pool, worker_id, activity).await?)
    }

    async fn release(&self, worker_id: &str) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::release(&self.pool, worker_id).await?)
    }

    async fn fail(&self, worker_id: &str, max_attempts: i16) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::fail(&self.pool, worker_id, max_attempts).await?)
    }

    async fn complete(&self, worker_id: &str) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::complete(&self.pool, worker_id).await?)
    }

    async fn provision_window(&self, kind: &str, limit: i64) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::provision_window(&self.pool, kind, limit).await?)
    }

    async fn find_stale(&self, cutoff: Timestamp) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::find_stale(&self.pool, cutoff).await?)
    }

    async fn reclaim(
        &self,
        task_id: DbId,
        worker_id: &str,
        max_attempts: i16,
    ) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::reclaim(&self.pool, task_id, worker_id, max_attempts).await?)
    }
}
