//! Shared types for the OAuth client workspace
//!
//! `Secret` keeps consumer/client secrets out of `Debug` output and logs;
//! `Error` covers configuration loading for the host binary.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
