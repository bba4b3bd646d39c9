//! Wire types for the worker ↔ controller callback protocol.
//!
//! Requests are form-encoded `POST`s; responses are JSON. The runner
//! serializes [`CallbackForm`] and the controller deserializes it, so both
//! ends share these definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Event reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackState {
    /// Worker is idle and asks for a task.
    Ready,
    /// Heartbeat with a progress description.
    Running,
    /// Instance is being preempted; the task goes back to the queue.
    Terminated,
    /// The command exited non-zero.
    Failed,
    /// The command exited zero.
    Completed,
}

impl CallbackState {
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackState::Ready => "ready",
            CallbackState::Running => "running",
            CallbackState::Terminated => "terminated",
            CallbackState::Failed => "failed",
            CallbackState::Completed => "completed",
        }
    }
}

impl fmt::Display for CallbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(CallbackState::Ready),
            "running" => Ok(CallbackState::Running),
            "terminated" => Ok(CallbackState::Terminated),
            "failed" => Ok(CallbackState::Failed),
            "completed" => Ok(CallbackState::Completed),
            other => Err(CoreError::Validation(format!(
                "Unknown callback state '{other}'"
            ))),
        }
    }
}

/// Form body of every callback request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackForm {
    pub state: CallbackState,
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

impl CallbackForm {
    pub fn new(state: CallbackState, worker_id: impl Into<String>) -> Self {
        Self {
            state,
            worker_id: worker_id.into(),
            activity: None,
        }
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }
}

/// JSON body returned by the callback endpoint.
///
/// `command` is present only when a `ready` call claimed a task. An empty
/// object means there is no work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl CallbackResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_command(command: Vec<String>) -> Self {
        Self {
            command: Some(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn state_parses_lowercase_names() {
        for state in [
            CallbackState::Ready,
            CallbackState::Running,
            CallbackState::Terminated,
            CallbackState::Failed,
            CallbackState::Completed,
        ] {
            assert_eq!(state.as_str().parse::<CallbackState>().unwrap(), state);
        }
    }

    #[test]
    fn unknown_state_is_a_validation_error() {
        assert_matches!(
            "paused".parse::<CallbackState>(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn empty_response_serializes_to_empty_object() {
        let json = serde_json::to_string(&CallbackResponse::empty()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn response_without_command_field_deserializes() {
        let parsed: CallbackResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.command, None);

        let parsed: CallbackResponse =
            serde_json::from_str(r#"{"command":["echo","hi"]}"#).unwrap();
        assert_eq!(
            parsed.command,
            Some(vec!["echo".to_string(), "hi".to_string()])
        );
    }

    #[test]
    fn form_omits_missing_activity() {
        let form = CallbackForm::new(CallbackState::Ready, "i-123");
        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["worker_id"], "i-123");
        assert!(json.get("activity").is_none());
    }
}
