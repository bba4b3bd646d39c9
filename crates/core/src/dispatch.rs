//! Task dispatch constants, retry policy, and submission validation.
//!
//! Pure functions shared by the callback state machine, the scheduler's
//! reclaim pass, and the runner. Kept free of I/O so both sides of the
//! callback protocol agree on the same numbers.

use std::time::Duration;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Task kind provisioned by default.
pub const DEFAULT_TASK_KIND: &str = "Pipeline";

/// Automatic requeues allowed before a task is permanently failed.
pub const DEFAULT_MAX_ATTEMPTS: i16 = 3;

/// Interval between scheduler cycles.
pub const DEFAULT_SCHEDULER_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Upper bound on tasks (and therefore instances) considered per cycle.
pub const DEFAULT_MAX_INSTANCES: i64 = 5;

/// A running task whose last heartbeat is older than this is reclaimed.
///
/// Must exceed the runner's `running` cadence with margin.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(11 * 60);

/// Spot requests not fulfilled within this window are abandoned by the
/// provider.
pub const DEFAULT_SPOT_VALID_FOR: Duration = Duration::from_secs(5 * 60);

/// Progress report interval (minutes) baked into the bootstrap command.
pub const DEFAULT_RUNNER_PROGRESS_MINUTES: u32 = 5;

/// Callback tokens stay valid this long so slow workers can still report.
pub const DEFAULT_CALLBACK_TOKEN_DAYS: i64 = 7;

/// How often the runner polls its child process for exit.
pub const CHILD_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum spacing between preemption-notice checks. A notice arrives
/// roughly two minutes before reclamation, so this allows two checks.
pub const PREEMPTION_CHECK_INTERVAL: Duration = Duration::from_secs(55);

/// Activity recorded on a freshly claimed task.
pub const INITIAL_ACTIVITY: &str = "Initialising…";

/// Maximum length of a task kind.
const MAX_KIND_LEN: usize = 64;

const MAX_WORKER_ID_LEN: usize = 128;

/// Maximum number of arguments in a task command.
const MAX_COMMAND_ARGS: usize = 1024;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// What happens to a task whose execution attempt failed or hung.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Put back in the queue with the new attempt count.
    Requeue { attempts: i16 },
    /// Attempts exhausted; the task becomes terminally failed.
    Fail { attempts: i16 },
}

impl FailureOutcome {
    /// Attempt count after the transition.
    pub fn attempts(self) -> i16 {
        match self {
            FailureOutcome::Requeue { attempts } | FailureOutcome::Fail { attempts } => attempts,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FailureOutcome::Fail { .. })
    }
}

/// Decide the retry-or-fail transition for a failed attempt.
///
/// The decision is taken on the attempt count *before* this failure is
/// counted: a task with `attempts < max_attempts` is requeued and its count
/// incremented; otherwise it fails. The stored count never exceeds
/// `max_attempts`.
///
/// Worker-reported failures and heartbeat reclaims share this rule.
pub fn failure_outcome(attempts: i16, max_attempts: i16) -> FailureOutcome {
    if attempts < max_attempts {
        FailureOutcome::Requeue {
            attempts: attempts + 1,
        }
    } else {
        FailureOutcome::Fail {
            attempts: attempts.max(max_attempts),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a task kind.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_KIND_LEN` characters.
/// - Alphanumeric, hyphen, or underscore only (it is embedded in tokens and
///   log fields).
pub fn validate_kind(kind: &str) -> Result<(), CoreError> {
    if kind.is_empty() {
        return Err(CoreError::Validation(
            "Task kind must not be empty".to_string(),
        ));
    }
    if kind.len() > MAX_KIND_LEN {
        return Err(CoreError::Validation(format!(
            "Task kind must not exceed {MAX_KIND_LEN} characters"
        )));
    }
    if !kind
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(
            "Task kind may only contain alphanumeric, hyphen, or underscore characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Validate a task command (argument vector).
pub fn validate_command(command: &[String]) -> Result<(), CoreError> {
    let Some(program) = command.first() else {
        return Err(CoreError::Validation(
            "Task command must not be empty".to_string(),
        ));
    };
    if program.trim().is_empty() {
        return Err(CoreError::Validation(
            "Task command program must not be blank".to_string(),
        ));
    }
    if command.len() > MAX_COMMAND_ARGS {
        return Err(CoreError::Validation(format!(
            "Task command must not exceed {MAX_COMMAND_ARGS} arguments"
        )));
    }
    Ok(())
}

/// Validate the worker id a callback claims to come from.
pub fn validate_worker_id(worker_id: &str) -> Result<(), CoreError> {
    if worker_id.is_empty() {
        return Err(CoreError::Validation(
            "Worker id must not be empty".to_string(),
        ));
    }
    if worker_id.len() > MAX_WORKER_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Worker id must not exceed {MAX_WORKER_ID_LEN} characters"
        )));
    }
    if worker_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::Validation(
            "Worker id must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}
