//! Narrow interface over the cloud provider.
//!
//! The scheduler only needs four operations: price discovery, spot
//! provisioning with an embedded bootstrap script, instance status, and
//! termination. [`ComputeGateway`] captures exactly those so the scheduler
//! can be driven by a fake in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayResult;

/// Current spot price for one availability zone.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotPrice {
    pub zone: String,
    /// Hourly price in USD.
    pub price: f64,
}

/// Parameters for a single spot instance request.
#[derive(Debug, Clone)]
pub struct InstanceRequest {
    pub zone: String,
    pub instance_type: String,
    /// Plain-text bootstrap script; the gateway handles any encoding.
    pub bootstrap: String,
    /// The request is abandoned if not fulfilled within this window.
    pub valid_for: Duration,
}

/// Lifecycle state of a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Stopping,
    Stopped,
    /// Terminated, or unknown to the provider.
    Terminated,
}

impl InstanceState {
    pub fn is_running(self) -> bool {
        self == InstanceState::Running
    }

    /// Map a provider state name (`running`, `shutting-down`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "shutting-down" => Some(Self::ShuttingDown),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud provider operations used by the scheduler.
#[async_trait]
pub trait ComputeGateway: Send + Sync {
    /// Current spot prices for `instance_type` in each of `zones`. Zones
    /// without an offer are simply absent from the result.
    async fn describe_spot_prices(
        &self,
        zones: &[String],
        instance_type: &str,
    ) -> GatewayResult<Vec<SpotPrice>>;

    /// Request one spot instance. Returns the provider's request id;
    /// fulfilment is asynchronous.
    async fn request_instance(&self, request: &InstanceRequest) -> GatewayResult<String>;

    /// Current state of the instance. Unknown ids report
    /// [`InstanceState::Terminated`].
    async fn describe_instance(&self, instance_id: &str) -> GatewayResult<InstanceState>;

    async fn terminate_instance(&self, instance_id: &str) -> GatewayResult<()>;
}
