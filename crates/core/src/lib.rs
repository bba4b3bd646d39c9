//! Domain types and pure lifecycle rules shared by the controller and the
//! runner.
//!
//! This crate has no internal dependencies and performs no I/O.

pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod types;
