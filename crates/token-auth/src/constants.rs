//! Protocol constants for the external authorization service
//!
//! Path segments are appended to a service base URL such as
//! `https://auth.example.com/svc-a`. The timing defaults give a user one
//! minute to finish the browser flow.

use std::time::Duration;

/// Begins an interactive flow; opened in the user's browser.
pub const START_PATH: &str = "start";

/// Polled for the outcome of a flow.
pub const FETCH_TOKEN_PATH: &str = "get-token";

/// Exchanges a refresh token for a new token set.
pub const REFRESH_TOKEN_PATH: &str = "refresh-token";

/// Query parameter carrying the per-attempt correlation id.
pub const REQUEST_ID_PARAM: &str = "request_id";

/// Query parameter carrying the stored refresh token.
pub const REFRESH_TOKEN_PARAM: &str = "refresh_token";

/// Response field naming the flow state. Never persisted.
pub const STATUS_FIELD: &str = "status";

pub const MESSAGE_FIELD: &str = "message";
pub const ACCESS_TOKEN_FIELD: &str = "access_token";
pub const REFRESH_TOKEN_FIELD: &str = "refresh_token";

/// Wait between two polls of the fetch endpoint.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polls before giving up (10s x 6 = 60s ceiling).
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 6;

/// Bound on a single HTTP request, independent of the poll interval.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
