//! Handler for the worker callback endpoint.
//!
//! Workers authenticate with the signed token in the URL path; the token
//! fixes the task kind they may claim.

use axum::extract::{Path, State};
use axum::{Form, Json};
use spotline_core::dispatch::validate_worker_id;
use spotline_core::error::CoreError;
use spotline_core::protocol::{CallbackForm, CallbackResponse};

use crate::auth::callback_token;
use crate::engine::callback;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /callback/{token}
///
/// Form body `{state, worker_id, activity?}`. Answers `{"command": [...]}`
/// when a `ready` call claimed a task and `{}` otherwise. Store failures
/// answer 503 so the worker retries.
pub async fn handle_callback(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<CallbackForm>,
) -> AppResult<Json<CallbackResponse>> {
    let claims = callback_token::verify(&token, &state.config.callback).map_err(|e| {
        tracing::warn!(error = %e, worker_id = %form.worker_id, "Rejected callback token");
        AppError::Core(CoreError::Unauthorized(
            "Invalid or expired callback token".to_string(),
        ))
    })?;
    validate_worker_id(&form.worker_id)?;

    let response = callback::apply(
        state.store.as_ref(),
        &claims.kind,
        &form,
        state.config.max_attempts,
    )
    .await?;

    Ok(Json(response))
}
