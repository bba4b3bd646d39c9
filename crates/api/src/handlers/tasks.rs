//! Handlers for the `/tasks` resource.
//!
//! Submission computes the task's signed callback URL before insertion;
//! the read endpoints let a results collaborator poll terminal status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use spotline_core::dispatch::{validate_command, validate_kind};
use spotline_core::error::CoreError;
use spotline_core::types::DbId;
use spotline_db::models::status::TaskStatus;
use spotline_db::models::task::{SubmitTask, TaskListQuery};

use crate::auth::callback_token;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/tasks`.
#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub kind: String,
    pub command: Vec<String>,
}

/// Query parameters for `GET /api/v1/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksParams {
    pub kind: Option<String>,
    /// Status name: `queued`, `running`, `completed` or `failed`.
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks
///
/// Queue a new task. Returns 201 with the created task, whose
/// `callback_url` is already signed for its kind.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(input): Json<CreateTask>,
) -> AppResult<impl IntoResponse> {
    validate_kind(&input.kind)?;
    validate_command(&input.command)?;

    let token = callback_token::sign(&input.kind, &state.config.callback)
        .map_err(|e| AppError::InternalError(format!("Failed to sign callback token: {e}")))?;

    let submit = SubmitTask {
        callback_url: callback_token::callback_url(&state.config.public_base_url, &token),
        kind: input.kind,
        command: input.command,
    };
    let task = state.store.submit(&submit).await?;

    tracing::info!(task_id = task.id, kind = %task.kind, "Task submitted");

    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks
///
/// List tasks newest first, optionally filtered by `kind` and `status`.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListTasksParams>,
) -> AppResult<impl IntoResponse> {
    let status_id = params
        .status
        .as_deref()
        .map(|name| {
            TaskStatus::from_name(name).map(TaskStatus::id).ok_or_else(|| {
                AppError::Core(CoreError::Validation(format!("Unknown task status '{name}'")))
            })
        })
        .transpose()?;

    let query = TaskListQuery {
        kind: params.kind,
        status_id,
        limit: params.limit,
        offset: params.offset,
    };
    let tasks = state.store.list(&query).await?;

    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = state
        .store
        .find_by_id(task_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        }))?;

    Ok(Json(DataResponse { data: task }))
}
