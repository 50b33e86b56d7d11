//! Token resolution policy
//!
//! Given a service base URL and a force flag, decide between the cached
//! token, a refresh, and a full interactive acquisition:
//!
//! 1. No cached access token → acquire
//! 2. Cached token, no force → return it (no network)
//! 3. Force with a cached refresh token → refresh
//! 4. Force without a refresh token → acquire
//!
//! `TokenResolver::resolve_outcome()` folds every result into a
//! `ToolOutcome` so nothing but `{status, token | message}` crosses the
//! tool boundary.

pub mod outcome;
pub mod resolver;

pub use outcome::{OutcomeStatus, ToolOutcome};
pub use resolver::{Resolution, ResolutionPath, TokenResolver};
