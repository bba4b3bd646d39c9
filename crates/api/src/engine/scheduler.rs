//! Periodic provision/reclaim loop.
//!
//! Every `interval` the scheduler runs two independent passes:
//!
//! 1. **Provision**: queued tasks inside the provisioning window each get
//!    one spot instance, placed in the cheapest zone.
//! 2. **Reclaim**: running tasks whose worker has been silent longer than
//!    the heartbeat timeout have their instance terminated and go through
//!    the retry-or-fail transition.
//!
//! Errors never escape a cycle. Anything that fails is logged and picked
//! up again on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use spotline_cloud::bootstrap;
use spotline_cloud::cache::ProvisioningCache;
use spotline_cloud::gateway::{ComputeGateway, InstanceRequest};
use spotline_cloud::zones::{availability_zones, cheapest_zone};
use spotline_db::models::status::TaskStatus;
use spotline_db::models::task::Task;
use spotline_db::store::TaskStore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;

/// Outcome counters for one scheduler cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Spot requests accepted by the gateway.
    pub requested: usize,
    /// Spot requests the gateway rejected.
    pub request_errors: usize,
    /// Hung tasks put back in the queue.
    pub requeued: usize,
    /// Hung tasks that ran out of attempts.
    pub failed: usize,
    /// Hung tasks left alone this cycle (gateway error or concurrent change).
    pub skipped: usize,
}

/// Background scheduler owning the provisioning cache.
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    gateway: Arc<dyn ComputeGateway>,
    config: SchedulerConfig,
    cache: ProvisioningCache,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        gateway: Arc<dyn ComputeGateway>,
        config: SchedulerConfig,
    ) -> Self {
        let cache = ProvisioningCache::new(config.cache_ttl);
        Self {
            store,
            gateway,
            config,
            cache,
        }
    }

    /// Run cycles until the cancellation token is triggered. The first
    /// cycle starts immediately; a slow cycle delays the next tick rather
    /// than overlapping it.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            kind = %self.config.task_kind,
            max_instances = self.config.max_instances,
            "Scheduler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    tracing::info!(
                        requested = report.requested,
                        request_errors = report.request_errors,
                        requeued = report.requeued,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Scheduler cycle finished",
                    );
                }
            }
        }
    }

    /// One cycle: provision, then reclaim.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        self.provision_pass(&mut report).await;
        self.reclaim_pass(&mut report).await;
        report
    }

    // ── Provision ───────────────────────────────────────────────────────

    /// Request one instance per queued task in the provisioning window.
    pub async fn provision_pass(&mut self, report: &mut CycleReport) {
        let needed = match self
            .store
            .provision_window(&self.config.task_kind, self.config.max_instances)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load provisioning window");
                return;
            }
        };
        if needed.is_empty() {
            return;
        }

        let Some(region) = self.config.region.clone() else {
            tracing::warn!(
                needed = needed.len(),
                "No region configured, skipping provisioning",
            );
            return;
        };

        let zone = self.select_zone(&region).await;
        tracing::info!(needed = needed.len(), zone = %zone, "Provisioning instances");

        for task in &needed {
            self.request_instance(task, &zone, report).await;
        }
    }

    async fn request_instance(&mut self, task: &Task, zone: &str, report: &mut CycleReport) {
        let request = InstanceRequest {
            zone: zone.to_string(),
            instance_type: self.config.instance_type.clone(),
            bootstrap: bootstrap::render(&task.callback_url, self.config.runner_progress_minutes),
            valid_for: self.config.spot_valid_for,
        };

        match self.gateway.request_instance(&request).await {
            Ok(request_id) => {
                report.requested += 1;
                tracing::info!(
                    task_id = task.id,
                    request_id = %request_id,
                    zone,
                    "Spot instance requested",
                );
            }
            Err(e) => {
                report.request_errors += 1;
                self.cache.invalidate(&self.config.instance_type);
                tracing::error!(task_id = task.id, zone, error = %e, "Spot request failed");
            }
        }
    }

    /// Cheapest zone for the configured instance type.
    ///
    /// Served from the cache while fresh. On a price lookup failure (or no
    /// offers) falls back to the configured default zone, then to the
    /// region's first candidate zone.
    pub async fn select_zone(&mut self, region: &str) -> String {
        let instance_type = self.config.instance_type.clone();
        if let Some(zone) = self.cache.zone(&instance_type) {
            return zone.to_string();
        }

        let candidates = availability_zones(region);
        match self
            .gateway
            .describe_spot_prices(&candidates, &instance_type)
            .await
        {
            Ok(prices) => match cheapest_zone(&prices) {
                Some(zone) => {
                    let zone = zone.to_string();
                    self.cache.store(&instance_type, &zone);
                    return zone;
                }
                None => {
                    tracing::warn!(instance_type = %instance_type, "No spot price offers returned");
                }
            },
            Err(e) => {
                self.cache.invalidate(&instance_type);
                tracing::warn!(error = %e, "Spot price lookup failed, using default zone");
            }
        }

        self.config
            .default_zone
            .clone()
            .or_else(|| candidates.into_iter().next())
            .unwrap_or_default()
    }

    // ── Reclaim ─────────────────────────────────────────────────────────

    /// Terminate and requeue (or fail) tasks whose heartbeat went stale.
    pub async fn reclaim_pass(&mut self, report: &mut CycleReport) {
        let cutoff = Utc::now() - heartbeat_timeout(self.config.heartbeat_timeout);
        let stale = match self.store.find_stale(cutoff).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to scan for stale tasks");
                return;
            }
        };

        for task in &stale {
            self.reclaim_task(task, report).await;
        }
    }

    async fn reclaim_task(&self, task: &Task, report: &mut CycleReport) {
        let Some(worker_id) = task.worker_id.as_deref() else {
            report.skipped += 1;
            return;
        };

        match self.gateway.describe_instance(worker_id).await {
            Ok(state) if state.is_running() => {
                if let Err(e) = self.gateway.terminate_instance(worker_id).await {
                    report.skipped += 1;
                    tracing::warn!(
                        task_id = task.id,
                        worker_id,
                        error = %e,
                        "Failed to terminate hung instance",
                    );
                    return;
                }
                tracing::info!(task_id = task.id, worker_id, "Hung instance terminated");
            }
            Ok(state) => {
                tracing::debug!(task_id = task.id, worker_id, state = %state, "Hung instance already gone");
            }
            Err(e) => {
                report.skipped += 1;
                tracing::warn!(
                    task_id = task.id,
                    worker_id,
                    error = %e,
                    "Failed to describe hung instance",
                );
                return;
            }
        }

        match self
            .store
            .reclaim(task.id, worker_id, self.config.max_attempts)
            .await
        {
            Ok(Some(reclaimed)) if reclaimed.is(TaskStatus::Failed) => {
                report.failed += 1;
                tracing::warn!(
                    task_id = reclaimed.id,
                    attempts = reclaimed.attempts,
                    "Hung task out of attempts, marked failed",
                );
            }
            Ok(Some(reclaimed)) => {
                report.requeued += 1;
                tracing::info!(
                    task_id = reclaimed.id,
                    attempts = reclaimed.attempts,
                    "Hung task requeued",
                );
            }
            Ok(None) => {
                report.skipped += 1;
                tracing::debug!(task_id = task.id, worker_id, "Task changed since stale scan");
            }
            Err(e) => {
                report.skipped += 1;
                tracing::error!(task_id = task.id, error = %e, "Failed to reclaim task");
            }
        }
    }
}

/// Out-of-range timeouts are capped at a year.
fn heartbeat_timeout(timeout: Duration) -> chrono::Duration {
    chrono::Duration::from_std(timeout)
        .unwrap_or_else(|_| chrono::Duration::days(365))
        .min(chrono::Duration::days(365))
}
