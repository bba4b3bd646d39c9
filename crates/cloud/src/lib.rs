//! Cloud compute gateway for spot-instance provisioning.
//!
//! Provides the [`gateway::ComputeGateway`] seam used by the scheduler,
//! its EC2 implementation, cheapest-zone selection, the provisioning
//! cache, bootstrap user-data rendering, and an IMDSv2 metadata client
//! used on the instances themselves.

pub mod bootstrap;
pub mod cache;
pub mod ec2;
pub mod error;
pub mod gateway;
pub mod metadata;
pub mod zones;
