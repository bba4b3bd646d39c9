//! Spotline worker runner.
//!
//! Runs on each provisioned instance: asks the controller for work through
//! its callback URL, supervises the command, reports heartbeats and the
//! outcome, and bails out when the instance is about to be preempted.

pub mod activity;
pub mod cli;
pub mod client;
pub mod error;
pub mod preemption;
pub mod runner;
pub mod scratch;
pub mod supervisor;
