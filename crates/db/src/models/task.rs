//! Task entity model and DTOs.

use serde::{Deserialize, Serialize};
use spotline_core::types::{DbId, Timestamp, WorkerId};
use sqlx::FromRow;

use super::status::{StatusId, TaskStatus};

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub kind: String,
    pub command: Vec<String>,
    pub callback_url: String,
    pub status_id: StatusId,
    pub worker_id: Option<WorkerId>,
    pub activity: String,
    pub attempts: i16,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub last_heartbeat_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Task {
    /// Decoded status. `None` only if the row holds an unknown status id.
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_id(self.status_id)
    }

    pub fn is(&self, status: TaskStatus) -> bool {
        self.status_id == status.id()
    }
}

/// DTO for inserting a new queued task.
///
/// `callback_url` is computed by the submitter before insertion; it embeds
/// a signed token bound to `kind`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTask {
    pub kind: String,
    pub command: Vec<String>,
    pub callback_url: String,
}

/// Query parameters for listing tasks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskListQuery {
    /// Filter by kind.
    pub kind: Option<String>,
    /// Filter by status ID.
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Maximum page size for task listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for task listing.
pub const DEFAULT_LIMIT: i64 = 50;

impl TaskListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
