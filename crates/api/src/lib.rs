//! Spotline controller library.
//!
//! Exposes config, state, error handling, routes and the dispatch engine
//! so integration tests and the binary entrypoint share them.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
