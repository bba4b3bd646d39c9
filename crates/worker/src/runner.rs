//! Top-level claim/execute/report loop.

use std::path::PathBuf;
use std::process::Stdio;

use spotline_core::protocol::CallbackState;
use tokio::process::Command;

use crate::client::CallbackClient;
use crate::error::RunnerError;
use crate::scratch;
use crate::supervisor::{ChildOutcome, Supervisor};

/// What one runner session did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    /// The session ended on a preemption notice.
    pub preempted: bool,
}

pub struct Runner {
    client: CallbackClient,
    work_dir: PathBuf,
    supervisor: Supervisor,
}

impl Runner {
    pub fn new(client: CallbackClient, work_dir: impl Into<PathBuf>, supervisor: Supervisor) -> Self {
        Self {
            client,
            work_dir: work_dir.into(),
            supervisor,
        }
    }

    /// Claim and run tasks until the queue is empty or the instance is
    /// preempted.
    ///
    /// Returns an error if the working directory holds files before a
    /// claim or if a `ready` call cannot reach the controller.
    pub async fn run(&mut self) -> Result<RunSummary, RunnerError> {
        let mut summary = RunSummary::default();

        loop {
            scratch::ensure_empty(&self.work_dir)?;

            let Some(command) = self.client.ready().await? else {
                tracing::info!(
                    completed = summary.completed,
                    failed = summary.failed,
                    "No more work",
                );
                return Ok(summary);
            };
            tracing::info!(command = ?command, "Task claimed");

            match self.execute(&command).await? {
                ChildOutcome::Exited { success: true, .. } => {
                    summary.completed += 1;
                    tracing::info!("Task completed");
                    self.client.outcome(CallbackState::Completed).await;
                }
                ChildOutcome::Exited { success: false, code } => {
                    summary.failed += 1;
                    tracing::warn!(exit_code = ?code, "Task failed");
                    self.client.outcome(CallbackState::Failed).await;
                }
                ChildOutcome::Preempted => {
                    summary.preempted = true;
                    tracing::warn!("Instance preempted, releasing task");
                    self.client.outcome(CallbackState::Terminated).await;
                    return Ok(summary);
                }
            }

            let removed = scratch::clear_files(&self.work_dir)?;
            tracing::debug!(removed, "Working directory cleared");
        }
    }

    /// Spawn `command` in the working directory and supervise it. A
    /// command that cannot be started counts as a failed run.
    async fn execute(&mut self, command: &[String]) -> Result<ChildOutcome, RunnerError> {
        let Some((program, args)) = command.split_first() else {
            return Ok(ChildOutcome::Exited {
                success: false,
                code: None,
            });
        };

        let spawned = Command::new(program)
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(program = %program, error = %e, "Failed to start command");
                return Ok(ChildOutcome::Exited {
                    success: false,
                    code: None,
                });
            }
        };

        self.supervisor.supervise(&mut child, &self.client).await
    }
}
