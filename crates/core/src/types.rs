/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Cloud instance identifier bound to a running task (e.g. `i-0abc...`).
pub type WorkerId = String;
