//! Types shared by the token-broker crates and the tool host
//!
//! - `Secret` keeps access and refresh tokens out of logs.
//! - `Error` covers configuration loading and path resolution.
//! - `paths` resolves the per-user credential store location.

mod error;
pub mod paths;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
