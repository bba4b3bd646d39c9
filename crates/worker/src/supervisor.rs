//! Child process supervision.
//!
//! The child is polled rather than awaited so that one loop can also pace
//! preemption checks and progress heartbeats:
//!
//! - every `poll_interval`, check whether the child has exited;
//! - at most every `preemption_interval`, ask the [`PreemptionWatch`];
//! - every `progress_interval` (if set), send a `running` heartbeat with
//!   the current [`ActivitySampler`] output.

use std::time::Duration;

use spotline_core::dispatch::{CHILD_POLL_INTERVAL, PREEMPTION_CHECK_INTERVAL};
use tokio::process::Child;
use tokio::time::Instant;

use crate::activity::ActivitySampler;
use crate::client::CallbackClient;
use crate::error::RunnerError;
use crate::preemption::PreemptionWatch;

/// Polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub preemption_interval: Duration,
    /// `None` disables heartbeats.
    pub progress_interval: Option<Duration>,
}

impl SupervisorConfig {
    /// Production cadence with heartbeats every `progress_minutes`
    /// (0 disables them).
    pub fn with_progress_minutes(progress_minutes: u32) -> Self {
        let progress_interval = (progress_minutes > 0)
            .then(|| Duration::from_secs(u64::from(progress_minutes) * 60));
        Self {
            poll_interval: CHILD_POLL_INTERVAL,
            preemption_interval: PREEMPTION_CHECK_INTERVAL,
            progress_interval,
        }
    }
}

/// How supervision of one child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOutcome {
    /// The child exited on its own.
    Exited { success: bool, code: Option<i32> },
    /// A preemption notice arrived while the child was running.
    Preempted,
}

pub struct Supervisor {
    config: SupervisorConfig,
    watch: Box<dyn PreemptionWatch>,
    sampler: ActivitySampler,
    /// Shared across children so back-to-back tasks do not reset the
    /// preemption cadence.
    last_preemption_check: Instant,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        watch: Box<dyn PreemptionWatch>,
        sampler: ActivitySampler,
    ) -> Self {
        Self {
            config,
            watch,
            sampler,
            last_preemption_check: Instant::now(),
        }
    }

    /// Poll `child` until it exits or the instance is preempted. On
    /// preemption the child is sent a kill signal and left to the host
    /// shutdown.
    pub async fn supervise(
        &mut self,
        child: &mut Child,
        client: &CallbackClient,
    ) -> Result<ChildOutcome, RunnerError> {
        let mut last_progress = Instant::now();

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            if let Some(status) = child.try_wait()? {
                return Ok(ChildOutcome::Exited {
                    success: status.success(),
                    code: status.code(),
                });
            }

            let now = Instant::now();
            if now.duration_since(self.last_preemption_check) >= self.config.preemption_interval {
                self.last_preemption_check = now;
                if self.watch.notice_pending().await {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(error = %e, "Failed to kill child after preemption notice");
                    }
                    return Ok(ChildOutcome::Preempted);
                }
            }

            if let Some(progress) = self.config.progress_interval {
                if now.duration_since(last_progress) >= progress {
                    last_progress = now;
                    let activity = self.sampler.sample();
                    tracing::debug!(activity = %activity, "Sending heartbeat");
                    client.running(&activity).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_minutes_disables_progress() {
        let config = SupervisorConfig::with_progress_minutes(0);
        assert_eq!(config.progress_interval, None);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.preemption_interval, Duration::from_secs(55));
    }

    #[test]
    fn progress_minutes_convert_to_seconds() {
        let config = SupervisorConfig::with_progress_minutes(5);
        assert_eq!(config.progress_interval, Some(Duration::from_secs(300)));
    }
}
