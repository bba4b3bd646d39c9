//! Response envelope for the task API.
//!
//! Task submission and results use a `{ "data": ... }` envelope. The
//! callback endpoint does not: workers read `{ "command": [...] }` directly.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
