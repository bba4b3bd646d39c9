//! Availability zone derivation and cheapest-zone selection.

use crate::gateway::SpotPrice;

/// Zone suffixes considered for provisioning.
const ZONE_SUFFIXES: [char; 3] = ['a', 'b', 'c'];

/// Candidate availability zones for a region, e.g. `eu-west-2` →
/// `eu-west-2a`, `eu-west-2b`, `eu-west-2c`.
pub fn availability_zones(region: &str) -> Vec<String> {
    ZONE_SUFFIXES
        .iter()
        .map(|suffix| format!("{region}{suffix}"))
        .collect()
}

/// Zone with the lowest price. Ties go to the first offer; non-finite
/// prices are ignored.
pub fn cheapest_zone(prices: &[SpotPrice]) -> Option<&str> {
    prices
        .iter()
        .filter(|p| p.price.is_finite())
        .fold(None::<&SpotPrice>, |best, p| match best {
            Some(b) if b.price <= p.price => Some(b),
            _ => Some(p),
        })
        .map(|p| p.zone.as_str())
}
