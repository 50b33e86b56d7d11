//! HTTP client construction

use tracing::warn;

use crate::error::{Error, Result};

/// Build the client shared by the acquirer and refresher.
///
/// Certificate verification stays on unless `accept_invalid_certs` is set,
/// for authorization services running on self-signed certificates.
/// Per-request timeouts are applied by the callers, not here.
pub fn build_client(accept_invalid_certs: bool) -> Result<reqwest::Client> {
    if accept_invalid_certs {
        warn!("TLS certificate verification disabled for authorization endpoints");
    }

    reqwest::Client::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| Error::HttpClient(e.to_string()))
}
