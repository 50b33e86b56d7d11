//! Refresh-token exchange
//!
//! One GET to `{base}/refresh-token?refresh_token=..`. No retry: a failed
//! refresh is returned to the caller, which may fall back to a full
//! acquisition. The request URL carries the refresh token, so errors are
//! stripped of their URL before being logged or returned.

use std::time::Duration;

use common::Secret;
use reqwest::StatusCode;
use tracing::{info, instrument, warn};

use crate::endpoints;
use crate::error::{Error, Result};
use crate::sink::CredentialSink;
use crate::token::{FlowStatus, TokenResponse};

/// Exchanges stored refresh tokens for new token sets.
pub struct TokenRefresher {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl TokenRefresher {
    pub fn new(client: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Refresh the token for `key` and merge the result into `sink`.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn refresh(
        &self,
        base_url: &str,
        key: &str,
        sink: &dyn CredentialSink,
        refresh_token: &Secret<String>,
    ) -> Result<Secret<String>> {
        let url = endpoints::refresh_url(base_url, refresh_token.expose())?;

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                Error::RefreshFailed(format!("refresh request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::RefreshFailed(format!("reading refresh response: {}", e.without_url()))
        })?;
        let parsed = serde_json::from_str::<TokenResponse>(&body);

        if status != StatusCode::OK {
            let detail = parsed
                .as_ref()
                .ok()
                .and_then(TokenResponse::message)
                .map(str::to_owned)
                .unwrap_or(body);
            warn!(%status, "refresh endpoint rejected the request");
            return Err(Error::RefreshFailed(format!(
                "refresh endpoint returned {status}: {detail}"
            )));
        }

        let response =
            parsed.map_err(|e| Error::RefreshFailed(format!("invalid refresh response: {e}")))?;

        if response.status != FlowStatus::Success {
            let message = response
                .message()
                .map(str::to_owned)
                .unwrap_or_else(|| {
                    format!("refresh endpoint reported {}", response.status.label())
                });
            warn!(error = %message, "refresh rejected");
            return Err(Error::RefreshFailed(message));
        }

        let grant = response.into_grant()?;
        let token = grant.access_token();
        sink.write(key, &grant).await?;

        info!(sink = %sink.describe(), "access token refreshed");
        Ok(token)
    }
}
