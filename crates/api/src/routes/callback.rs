//! Worker callback route (root level, outside `/api/v1`).

use axum::routing::post;
use axum::Router;

use crate::handlers::callback;
use crate::state::AppState;

/// `POST /callback/{token}`. The path matches the URLs baked into instance
/// bootstrap scripts, so it is not versioned.
pub fn router() -> Router<AppState> {
    Router::new().route("/callback/{token}", post(callback::handle_callback))
}
