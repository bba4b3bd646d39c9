//! Scheduler passes against the in-memory store and a scripted gateway.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::seed_task;
use spotline_api::config::SchedulerConfig;
use spotline_api::engine::scheduler::{CycleReport, Scheduler};
use spotline_cloud::error::{GatewayError, GatewayResult};
use spotline_cloud::gateway::{ComputeGateway, InstanceRequest, InstanceState, SpotPrice};
use spotline_db::models::status::TaskStatus;
use spotline_db::store::{MemoryTaskStore, TaskStore};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fake gateway
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    /// `None` makes price lookups fail.
    prices: Option<Vec<SpotPrice>>,
    price_lookups: usize,
    instances: HashMap<String, InstanceState>,
    /// Instances whose describe call errors.
    unreachable: Vec<String>,
    reject_requests: bool,
    /// Makes every terminate call fail.
    reject_terminate: bool,
    requests: Vec<InstanceRequest>,
    terminated: Vec<String>,
}

#[derive(Default, Clone)]
struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
}

fn api_error(operation: &'static str) -> GatewayError {
    GatewayError::Api {
        operation,
        message: "RequestLimitExceeded".to_string(),
    }
}

impl FakeGateway {
    fn with_prices(prices: &[(&str, f64)]) -> Self {
        let gateway = Self::default();
        gateway.state.lock().unwrap().prices = Some(
            prices
                .iter()
                .map(|(zone, price)| SpotPrice {
                    zone: zone.to_string(),
                    price: *price,
                })
                .collect(),
        );
        gateway
    }

    fn set_instance(&self, id: &str, state: InstanceState) {
        self.state
            .lock()
            .unwrap()
            .instances
            .insert(id.to_string(), state);
    }

    fn requests(&self) -> Vec<InstanceRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    fn terminated(&self) -> Vec<String> {
        self.state.lock().unwrap().terminated.clone()
    }
}

#[async_trait]
impl ComputeGateway for FakeGateway {
    async fn describe_spot_prices(
        &self,
        zones: &[String],
        _instance_type: &str,
    ) -> GatewayResult<Vec<SpotPrice>> {
        let mut state = self.state.lock().unwrap();
        state.price_lookups += 1;
        let prices = state
            .prices
            .clone()
            .ok_or_else(|| api_error("DescribeSpotPriceHistory"))?;
        Ok(prices
            .into_iter()
            .filter(|p| zones.contains(&p.zone))
            .collect())
    }

    async fn request_instance(&self, request: &InstanceRequest) -> GatewayResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.reject_requests {
            return Err(api_error("RequestSpotInstances"));
        }
        state.requests.push(request.clone());
        Ok(format!("sir-{}", state.requests.len()))
    }

    async fn describe_instance(&self, instance_id: &str) -> GatewayResult<InstanceState> {
        let state = self.state.lock().unwrap();
        if state.unreachable.iter().any(|id| id == instance_id) {
            return Err(api_error("DescribeInstances"));
        }
        Ok(state
            .instances
            .get(instance_id)
            .copied()
            .unwrap_or(InstanceState::Terminated))
    }

    async fn terminate_instance(&self, instance_id: &str) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.reject_terminate {
            return Err(api_error("TerminateInstances"));
        }
        state.terminated.push(instance_id.to_string());
        state
            .instances
            .insert(instance_id.to_string(), InstanceState::ShuttingDown);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        region: Some("eu-west-2".to_string()),
        ..SchedulerConfig::default()
    }
}

fn scheduler(store: &MemoryTaskStore, gateway: &FakeGateway, config: SchedulerConfig) -> Scheduler {
    Scheduler::new(
        Arc::new(store.clone()),
        Arc::new(gateway.clone()),
        config,
    )
}

/// Claim the oldest queued task for `worker_id` and backdate its heartbeat
/// past the default timeout.
async fn make_stale(store: &MemoryTaskStore, worker_id: &str) -> i64 {
    let task = store
        .claim_next("Pipeline", worker_id, 3)
        .await
        .unwrap()
        .expect("a queued task to claim");
    let stale_at = Utc::now() - chrono::Duration::minutes(12);
    assert!(store.set_last_heartbeat(task.id, Some(stale_at)).await);
    task.id
}

// ---------------------------------------------------------------------------
// Provision pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provisions_one_instance_per_queued_task_in_cheapest_zone() {
    let store = MemoryTaskStore::new();
    seed_task(&store, "Pipeline", &["a"]).await;
    seed_task(&store, "Pipeline", &["b"]).await;
    let gateway = FakeGateway::with_prices(&[
        ("eu-west-2a", 0.40),
        ("eu-west-2b", 0.35),
        ("eu-west-2c", 0.38),
    ]);

    let report = scheduler(&store, &gateway, test_scheduler_config())
        .run_cycle()
        .await;

    assert_eq!(report.requested, 2);
    let requests = gateway.requests();
    assert!(requests.iter().all(|r| r.zone == "eu-west-2b"));
    assert!(requests.iter().all(|r| r.instance_type == "c5d.4xlarge"));
    assert!(requests.iter().all(|r| r.valid_for == Duration::from_secs(300)));
    assert!(requests[0].bootstrap.contains("--progress 5"));
    assert!(requests[0].bootstrap.contains("/callback/"));
    // One price lookup serves the whole cycle.
    assert_eq!(gateway.state.lock().unwrap().price_lookups, 1);
}

#[tokio::test]
async fn running_tasks_count_against_the_window() {
    let store = MemoryTaskStore::new();
    for command in ["a", "b", "c"] {
        seed_task(&store, "Pipeline", &[command]).await;
    }
    store.claim_next("Pipeline", "i-1", 3).await.unwrap();
    let gateway = FakeGateway::with_prices(&[("eu-west-2a", 0.4)]);
    let config = SchedulerConfig {
        max_instances: 2,
        ..test_scheduler_config()
    };

    let mut scheduler = scheduler(&store, &gateway, config);
    let mut report = CycleReport::default();
    scheduler.provision_pass(&mut report).await;

    assert_eq!(report.requested, 1);
}

#[tokio::test]
async fn price_failure_falls_back_to_default_zone() {
    let store = MemoryTaskStore::new();
    seed_task(&store, "Pipeline", &["a"]).await;
    let gateway = FakeGateway::default();
    let config = SchedulerConfig {
        default_zone: Some("eu-west-2c".to_string()),
        ..test_scheduler_config()
    };

    let report = scheduler(&store, &gateway, config).run_cycle().await;

    assert_eq!(report.requested, 1);
    assert_eq!(gateway.requests()[0].zone, "eu-west-2c");
}

#[tokio::test]
async fn price_failure_without_default_uses_first_zone() {
    let store = MemoryTaskStore::new();
    seed_task(&store, "Pipeline", &["a"]).await;
    let gateway = FakeGateway::default();

    scheduler(&store, &gateway, test_scheduler_config())
        .run_cycle()
        .await;

    assert_eq!(gateway.requests()[0].zone, "eu-west-2a");
}

#[tokio::test]
async fn zone_is_cached_between_cycles() {
    let store = MemoryTaskStore::new();
    seed_task(&store, "Pipeline", &["a"]).await;
    let gateway = FakeGateway::with_prices(&[("eu-west-2b", 0.3)]);

    let mut scheduler = scheduler(&store, &gateway, test_scheduler_config());
    scheduler.run_cycle().await;
    scheduler.run_cycle().await;

    assert_eq!(gateway.state.lock().unwrap().price_lookups, 1);
    assert_eq!(gateway.requests().len(), 2);
}

#[tokio::test]
async fn rejected_request_invalidates_cached_zone() {
    let store = MemoryTaskStore::new();
    seed_task(&store, "Pipeline", &["a"]).await;
    let gateway = FakeGateway::with_prices(&[("eu-west-2b", 0.3)]);

    let mut scheduler = scheduler(&store, &gateway, test_scheduler_config());
    scheduler.run_cycle().await;
    gateway.state.lock().unwrap().reject_requests = true;
    let report = scheduler.run_cycle().await;
    assert_eq!(report.request_errors, 1);

    gateway.state.lock().unwrap().reject_requests = false;
    scheduler.run_cycle().await;

    assert_eq!(gateway.state.lock().unwrap().price_lookups, 2);
}

#[tokio::test]
async fn no_region_skips_provisioning() {
    let store = MemoryTaskStore::new();
    seed_task(&store, "Pipeline", &["a"]).await;
    let gateway = FakeGateway::with_prices(&[("eu-west-2b", 0.3)]);

    let report = scheduler(&store, &gateway, SchedulerConfig::default())
        .run_cycle()
        .await;

    assert_eq!(report.requested, 0);
    assert!(gateway.requests().is_empty());
}

// ---------------------------------------------------------------------------
// Reclaim pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_task_is_terminated_then_requeued_then_failed() {
    let store = MemoryTaskStore::new();
    let task = seed_task(&store, "Pipeline", &["sleep"]).await;
    store.set_attempts(task.id, 2).await;
    let gateway = FakeGateway::default();
    let config = SchedulerConfig {
        region: None,
        ..test_scheduler_config()
    };
    let mut scheduler = scheduler(&store, &gateway, config);

    make_stale(&store, "i-1").await;
    gateway.set_instance("i-1", InstanceState::Running);
    let report = scheduler.run_cycle().await;

    assert_eq!(report.requeued, 1);
    assert_eq!(gateway.terminated(), vec!["i-1".to_string()]);
    let stored = store.find_by_id(task.id).await.unwrap().unwrap();
    assert!(stored.is(TaskStatus::Queued));
    assert_eq!(stored.attempts, 3);
    assert!(stored.worker_id.is_none());
    assert!(stored.last_heartbeat_at.is_none());

    // Second hang: the instance is already gone, so nothing to terminate.
    make_stale(&store, "i-2").await;
    let report = scheduler.run_cycle().await;

    assert_eq!(report.failed, 1);
    assert_eq!(gateway.terminated().len(), 1);
    let stored = store.find_by_id(task.id).await.unwrap().unwrap();
    assert!(stored.is(TaskStatus::Failed));
    assert_eq!(stored.attempts, 3);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn fresh_heartbeats_are_left_alone() {
    let store = MemoryTaskStore::new();
    let task = seed_task(&store, "Pipeline", &["sleep"]).await;
    store.claim_next("Pipeline", "i-1", 3).await.unwrap();
    let gateway = FakeGateway::default();
    gateway.set_instance("i-1", InstanceState::Running);

    let mut scheduler = scheduler(&store, &gateway, test_scheduler_config());
    let mut report = CycleReport::default();
    scheduler.reclaim_pass(&mut report).await;

    assert_eq!(report, CycleReport::default());
    assert!(gateway.terminated().is_empty());
    assert!(store.find_by_id(task.id).await.unwrap().unwrap().is(TaskStatus::Running));
}

#[tokio::test]
async fn describe_error_skips_task_until_next_cycle() {
    let store = MemoryTaskStore::new();
    let task = seed_task(&store, "Pipeline", &["sleep"]).await;
    make_stale(&store, "i-1").await;
    let gateway = FakeGateway::default();
    gateway.state.lock().unwrap().unreachable.push("i-1".to_string());

    let mut scheduler = scheduler(&store, &gateway, test_scheduler_config());
    let report = scheduler.run_cycle().await;

    assert_eq!(report.skipped, 1);
    let stored = store.find_by_id(task.id).await.unwrap().unwrap();
    assert!(stored.is(TaskStatus::Running));
    assert_eq!(stored.attempts, 0);

    gateway.state.lock().unwrap().unreachable.clear();
    let report = scheduler.run_cycle().await;
    assert_eq!(report.requeued, 1);
}

#[tokio::test]
async fn terminate_error_leaves_task_running() {
    let store = MemoryTaskStore::new();
    let task = seed_task(&store, "Pipeline", &["sleep"]).await;
    make_stale(&store, "i-1").await;
    let gateway = FakeGateway::default();
    gateway.set_instance("i-1", InstanceState::Running);
    gateway.state.lock().unwrap().reject_terminate = true;

    let mut scheduler = scheduler(&store, &gateway, test_scheduler_config());
    let mut report = CycleReport::default();
    scheduler.reclaim_pass(&mut report).await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.requeued + report.failed, 0);
    let stored = store.find_by_id(task.id).await.unwrap().unwrap();
    assert!(stored.is(TaskStatus::Running));
    assert_eq!(stored.attempts, 0);
    assert_eq!(stored.worker_id.as_deref(), Some("i-1"));
}

#[tokio::test]
async fn one_gateway_error_does_not_stop_the_pass() {
    let store = MemoryTaskStore::new();
    let unreachable = seed_task(&store, "Pipeline", &["a"]).await;
    let reachable = seed_task(&store, "Pipeline", &["b"]).await;
    make_stale(&store, "i-1").await;
    make_stale(&store, "i-2").await;
    let gateway = FakeGateway::default();
    gateway.state.lock().unwrap().unreachable.push("i-1".to_string());
    gateway.set_instance("i-2", InstanceState::Running);

    let mut scheduler = scheduler(&store, &gateway, test_scheduler_config());
    let mut report = CycleReport::default();
    scheduler.reclaim_pass(&mut report).await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.requeued, 1);
    assert_eq!(gateway.terminated(), vec!["i-2".to_string()]);

    let stored = store.find_by_id(unreachable.id).await.unwrap().unwrap();
    assert!(stored.is(TaskStatus::Running));
    assert_eq!(stored.worker_id.as_deref(), Some("i-1"));

    let stored = store.find_by_id(reachable.id).await.unwrap().unwrap();
    assert!(stored.is(TaskStatus::Queued));
    assert_eq!(stored.attempts, 1);
}

#[tokio::test]
async fn completion_after_scan_wins_over_reclaim() {
    let store = MemoryTaskStore::new();
    let task = seed_task(&store, "Pipeline", &["sleep"]).await;
    make_stale(&store, "i-1").await;

    // The worker reports completion between the stale scan and the update.
    let cutoff = Utc::now() - chrono::Duration::minutes(11);
    let stale = store.find_stale(cutoff).await.unwrap();
    assert_eq!(stale.len(), 1);
    store.complete("i-1").await.unwrap();

    let reclaimed = store.reclaim(task.id, "i-1", 3).await.unwrap();
    assert!(reclaimed.is_none());
    assert!(store.find_by_id(task.id).await.unwrap().unwrap().is(TaskStatus::Completed));
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_exits_on_cancel() {
    let store = MemoryTaskStore::new();
    let gateway = FakeGateway::default();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        scheduler(&store, &gateway, test_scheduler_config()).run(cancel.clone()),
    );
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler should stop after cancellation")
        .unwrap();
}
