//! HTTP client for the controller's callback endpoint.
//!
//! Every call is a form-encoded `POST` of a [`CallbackForm`] to the signed
//! callback URL. Transient failures (transport errors, 5xx) are retried a
//! few times. A `ready` call that still fails is returned to the caller;
//! heartbeat and outcome calls only log.

use std::time::Duration;

use spotline_core::protocol::{CallbackForm, CallbackResponse, CallbackState};

use crate::error::RunnerError;

/// Attempts per callback, including the first.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback client bound to one URL and worker id.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: reqwest::Client,
    url: String,
    worker_id: String,
    attempts: u32,
    backoff: Duration,
}

impl CallbackClient {
    pub fn new(url: impl Into<String>, worker_id: impl Into<String>) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            worker_id: worker_id.into(),
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Override the retry schedule. `attempts` is clamped to at least one.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Ask for a task. `None` means the queue is empty.
    pub async fn ready(&self) -> Result<Option<Vec<String>>, RunnerError> {
        let form = CallbackForm::new(CallbackState::Ready, &self.worker_id);
        let response = self.send_with_retry(&form).await?;
        Ok(response.command.filter(|command| !command.is_empty()))
    }

    /// Heartbeat with the current activity.
    pub async fn running(&self, activity: &str) {
        let form = CallbackForm::new(CallbackState::Running, &self.worker_id)
            .with_activity(activity);
        self.report(&form).await;
    }

    /// Report `terminated`, `failed` or `completed`.
    pub async fn outcome(&self, state: CallbackState) {
        let form = CallbackForm::new(state, &self.worker_id);
        self.report(&form).await;
    }

    async fn report(&self, form: &CallbackForm) {
        if let Err(e) = self.send_with_retry(form).await {
            tracing::error!(state = %form.state, error = %e, "Callback failed, giving up");
        }
    }

    async fn send_with_retry(&self, form: &CallbackForm) -> Result<CallbackResponse, RunnerError> {
        let mut attempt = 1;
        loop {
            match self.send(form).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    tracing::warn!(
                        state = %form.state,
                        attempt,
                        error = %e,
                        "Callback failed, retrying",
                    );
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, form: &CallbackForm) -> Result<CallbackResponse, RunnerError> {
        let response = self.client.post(&self.url).form(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RunnerError::Callback {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
