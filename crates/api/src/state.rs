use std::sync::Arc;

use spotline_db::store::TaskStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Task persistence (Postgres in production, in-memory in tests).
    pub store: Arc<dyn TaskStore>,
    pub config: Arc<ServerConfig>,
}
