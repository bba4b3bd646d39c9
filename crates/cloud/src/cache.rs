//! Provisioning cache owned by the scheduler.
//!
//! Remembers the preferred zone per instance type so a cycle that needs
//! several instances only queries prices once. Entries expire after a TTL
//! and are dropped explicitly when the gateway misbehaves.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedZone {
    zone: String,
    fetched_at: Instant,
}

/// TTL cache of preferred availability zones keyed by instance type.
#[derive(Debug)]
pub struct ProvisioningCache {
    ttl: Duration,
    zones: HashMap<String, CachedZone>,
}

impl ProvisioningCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            zones: HashMap::new(),
        }
    }

    /// Preferred zone for `instance_type`, if one was stored within the TTL.
    pub fn zone(&self, instance_type: &str) -> Option<&str> {
        self.zones
            .get(instance_type)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.zone.as_str())
    }

    pub fn store(&mut self, instance_type: &str, zone: &str) {
        self.zones.insert(
            instance_type.to_string(),
            CachedZone {
                zone: zone.to_string(),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Forget the entry for `instance_type`. Returns whether one existed.
    pub fn invalidate(&mut self, instance_type: &str) -> bool {
        self.zones.remove(instance_type).is_some()
    }
}
