//! Callback authentication.
//!
//! - [`callback_token`] -- signed, time-limited tokens embedded in task
//!   callback URLs.

pub mod callback_token;
