//! Task dispatch engine.
//!
//! - [`callback`] applies worker callbacks to the task store.
//! - [`scheduler`] is the periodic provision/reclaim loop.

pub mod callback;
pub mod scheduler;
