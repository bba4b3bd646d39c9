//! Spot interruption notices.

use async_trait::async_trait;
use spotline_cloud::metadata::InstanceMetadata;

/// Source of preemption notices.
#[async_trait]
pub trait PreemptionWatch: Send + Sync {
    /// Whether the provider has scheduled this instance for reclamation.
    async fn notice_pending(&self) -> bool;
}

/// Reads `spot/instance-action` from the instance metadata service.
pub struct MetadataWatch {
    metadata: InstanceMetadata,
}

impl MetadataWatch {
    pub fn new(metadata: InstanceMetadata) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl PreemptionWatch for MetadataWatch {
    async fn notice_pending(&self) -> bool {
        match self.metadata.spot_instance_action().await {
            Ok(Some(notice)) => {
                tracing::warn!(notice = %notice, "Spot interruption notice received");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to check for interruption notice");
                false
            }
        }
    }
}

/// Used off-cloud, where nothing ever preempts the host.
pub struct NoPreemption;

#[async_trait]
impl PreemptionWatch for NoPreemption {
    async fn notice_pending(&self) -> bool {
        false
    }
}
