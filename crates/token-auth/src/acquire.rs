//! Interactive token acquisition
//!
//! State machine for one attempt:
//!
//! 1. Fresh UUID v4 correlation id.
//! 2. Open `{base}/start?request_id=..` in the browser (best-effort).
//! 3. Poll `{base}/get-token?request_id=..` every `interval`, at most
//!    `max_attempts` times, each request bounded by `request_timeout`.
//!    - `pending` → keep polling
//!    - `success` → merge fields through the sink, return the token
//!    - `error`   → stop with the server's message
//!    - transport failure, timeout, non-2xx, bad body → log, keep polling
//! 4. Ceiling reached → `AcquisitionTimeout`, carrying the start URL when
//!    the browser could not be opened.
//!
//! Nothing is persisted before `success`. Dropping the returned future
//! cancels the current wait and any in-flight request.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use reqwest::Url;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::browser::{BrowserLauncher, manual_navigation_message};
use crate::constants::{
    DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};
use crate::endpoints;
use crate::error::{Error, Result};
use crate::sink::CredentialSink;
use crate::token::{FlowStatus, TokenGrant, TokenResponse};

/// Polling cadence and bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before each poll.
    pub interval: Duration,
    pub max_attempts: u32,
    /// Bound on one HTTP request, independent of `interval`.
    pub request_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Drives the browser authorization flow and polls for its result.
pub struct TokenAcquirer {
    client: reqwest::Client,
    browser: Arc<dyn BrowserLauncher>,
    config: PollConfig,
}

impl TokenAcquirer {
    pub fn new(
        client: reqwest::Client,
        browser: Arc<dyn BrowserLauncher>,
        config: PollConfig,
    ) -> Self {
        Self {
            client,
            browser,
            config,
        }
    }

    /// Run one full acquisition for the service at `base_url`.
    ///
    /// On success the grant is written to `sink` under `key` and the access
    /// token is returned.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn acquire(
        &self,
        base_url: &str,
        key: &str,
        sink: &dyn CredentialSink,
    ) -> Result<Secret<String>> {
        let request_id = Uuid::new_v4().to_string();
        let start_url = endpoints::start_url(base_url, &request_id)?;
        let fetch_url = endpoints::fetch_url(base_url, &request_id)?;

        let manual_url = (!self.launch_browser(&start_url)).then_some(start_url);

        let grant = self.poll(&fetch_url, manual_url.as_ref()).await?;
        let token = grant.access_token();
        sink.write(key, &grant).await?;

        info!(sink = %sink.describe(), "access token acquired");
        Ok(token)
    }

    /// Whether the browser was opened.
    fn launch_browser(&self, start_url: &Url) -> bool {
        match self.browser.open(start_url.as_str()) {
            Ok(()) => {
                info!(url = %start_url, "opened browser for authorization");
                true
            }
            Err(e) => {
                warn!(
                    error = %e,
                    url = %start_url,
                    "{}",
                    manual_navigation_message(start_url.as_str())
                );
                false
            }
        }
    }

    /// `manual_url` is reported on timeout when the user had to navigate by hand.
    async fn poll(&self, fetch_url: &Url, manual_url: Option<&Url>) -> Result<TokenGrant> {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.config.interval).await;

            let response = match self.poll_once(fetch_url).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "poll attempt failed, retrying");
                    continue;
                }
            };

            match response.status {
                FlowStatus::Pending => {
                    debug!(attempt, max_attempts, "authorization pending");
                }
                FlowStatus::Success => {
                    debug!(attempt, "authorization completed");
                    return response.into_grant();
                }
                FlowStatus::Error => {
                    let message = response
                        .message()
                        .unwrap_or("authorization server reported an error without a message")
                        .to_owned();
                    warn!(attempt, error = %message, "authorization failed");
                    return Err(Error::ExternalServer(message));
                }
            }
        }

        warn!(max_attempts, "authorization not completed in time");
        Err(Error::AcquisitionTimeout {
            attempts: max_attempts,
            manual_url: manual_url.map(ToString::to_string),
        })
    }

    /// One bounded poll. Every failure here is transient.
    async fn poll_once(&self, fetch_url: &Url) -> Result<TokenResponse> {
        let response = self
            .client
            .get(fetch_url.clone())
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(format!("poll request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::TransientNetwork(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TransientNetwork(format!("invalid poll response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CredentialStore;
    use crate::testing::{RecordingBrowser, Reply, ScriptedAuthServer};
    use serde_json::json;

    fn fast_config() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(5),
            max_attempts: 6,
            request_timeout: Duration::from_millis(500),
        }
    }

    fn acquirer(browser: Arc<dyn BrowserLauncher>, config: PollConfig) -> TokenAcquirer {
        TokenAcquirer::new(reqwest::Client::new(), browser, config)
    }

    fn temp_store(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("credentials.json"))
    }

    #[test]
    fn default_config_matches_one_minute_ceiling() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.interval * config.max_attempts, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn success_after_pending_persists_and_returns_token() {
        let server = ScriptedAuthServer::start().await;
        server.script_polls([
            Reply::pending(),
            Reply::pending(),
            Reply::Json(json!({
                "status": "success",
                "access_token": "A",
                "refresh_token": "R",
                "expires_in": 3600,
            })),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let browser = Arc::new(RecordingBrowser::new());

        let token = acquirer(browser.clone(), fast_config())
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap();

        assert_eq!(token.expose(), "A");
        assert_eq!(server.polls(), 3);

        let doc = store.load().await.unwrap();
        assert_eq!(doc["svc_access_token"], "A");
        assert_eq!(doc["svc_refresh_token"], "R");
        assert_eq!(doc["svc_expires_in"], 3600);
        assert!(!doc.contains_key("svc_status"));
    }

    #[tokio::test]
    async fn browser_opens_start_url_with_polled_request_id() {
        let server = ScriptedAuthServer::start().await;
        server.script_polls([Reply::pending(), Reply::success("A")]);
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let browser = Arc::new(RecordingBrowser::new());

        acquirer(browser.clone(), fast_config())
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap();

        let opened = browser.opened();
        assert_eq!(opened.len(), 1);
        let start = Url::parse(&opened[0]).unwrap();
        assert_eq!(start.path(), "/svc/start");
        let (_, request_id) = start.query_pairs().next().unwrap();

        let polled = server.polled_request_ids();
        assert_eq!(polled.len(), 2);
        assert!(polled.iter().all(|id| *id == request_id));
        assert!(Uuid::parse_str(&request_id).is_ok());
    }

    #[tokio::test]
    async fn each_attempt_uses_a_fresh_request_id() {
        let server = ScriptedAuthServer::start().await;
        server.script_polls([Reply::success("A"), Reply::success("B")]);
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let acquirer = acquirer(Arc::new(RecordingBrowser::new()), fast_config());

        acquirer
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap();
        acquirer
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap();

        let ids = server.polled_request_ids();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn all_pending_times_out_after_max_attempts() {
        let server = ScriptedAuthServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);

        let err = acquirer(Arc::new(RecordingBrowser::new()), fast_config())
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::AcquisitionTimeout { attempts: 6, manual_url: None }),
            "got: {err:?}"
        );
        assert_eq!(server.polls(), 6);
        assert!(!store.path().exists(), "nothing persisted on timeout");
    }

    #[tokio::test]
    async fn error_status_stops_polling_immediately() {
        let server = ScriptedAuthServer::start().await;
        server.script_polls([
            Reply::pending(),
            Reply::error("user denied access"),
            Reply::success("never reached"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);

        let err = acquirer(Arc::new(RecordingBrowser::new()), fast_config())
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap_err();

        match err {
            Error::ExternalServer(message) => assert_eq!(message, "user denied access"),
            other => panic!("expected ExternalServer, got {other:?}"),
        }
        assert_eq!(server.polls(), 2);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let server = ScriptedAuthServer::start().await;
        server.script_polls([
            Reply::Status(503, json!({"status": "error", "message": "overloaded"})),
            Reply::Garbage,
            Reply::Stall(Duration::from_millis(300)),
            Reply::success("A"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let config = PollConfig {
            request_timeout: Duration::from_millis(100),
            ..fast_config()
        };

        let token = acquirer(Arc::new(RecordingBrowser::new()), config)
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap();

        assert_eq!(token.expose(), "A");
        assert_eq!(server.polls(), 4);
    }

    #[tokio::test]
    async fn unreachable_server_times_out_without_aborting_early() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let config = PollConfig {
            max_attempts: 3,
            ..fast_config()
        };

        let err = acquirer(Arc::new(RecordingBrowser::new()), config)
            .acquire("http://127.0.0.1:1/svc", "svc", &store)
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::AcquisitionTimeout { attempts: 3, .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn browser_failure_does_not_abort_flow() {
        let server = ScriptedAuthServer::start().await;
        server.script_polls([Reply::success("A")]);
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let browser = Arc::new(RecordingBrowser::failing());

        let token = acquirer(browser.clone(), fast_config())
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap();

        assert_eq!(token.expose(), "A");
        assert_eq!(browser.opened().len(), 1);
    }

    #[tokio::test]
    async fn success_without_access_token_is_malformed() {
        let server = ScriptedAuthServer::start().await;
        server.script_polls([Reply::Json(json!({"status": "success", "scope": "read"}))]);
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);

        let err = acquirer(Arc::new(RecordingBrowser::new()), fast_config())
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn cancelled_acquisition_persists_nothing() {
        let server = ScriptedAuthServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let config = PollConfig {
            interval: Duration::from_millis(50),
            ..fast_config()
        };
        let acquirer = acquirer(Arc::new(RecordingBrowser::new()), config);

        let result = tokio::time::timeout(
            Duration::from_millis(120),
            acquirer.acquire(&server.base_url("svc"), "svc", &store),
        )
        .await;

        assert!(result.is_err(), "acquisition should still be polling");
        let polls_at_cancel = server.polls();
        assert!(polls_at_cancel < 6);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(server.polls(), polls_at_cancel, "no polls after cancellation");
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn invalid_base_url_fails_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let browser = Arc::new(RecordingBrowser::new());

        let err = acquirer(browser.clone(), fast_config())
            .acquire("not a url", "svc", &store)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidServiceUrl(_)), "got: {err:?}");
        assert!(browser.opened().is_empty());
    }

    #[tokio::test]
    async fn failed_launch_surfaces_start_url_on_timeout() {
        let server = ScriptedAuthServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let browser = Arc::new(RecordingBrowser::failing());
        let config = PollConfig {
            max_attempts: 2,
            ..fast_config()
        };

        let err = acquirer(browser.clone(), config)
            .acquire(&server.base_url("svc"), "svc", &store)
            .await
            .unwrap_err();

        let start_url = browser.opened().pop().unwrap();
        match &err {
            Error::AcquisitionTimeout {
                attempts: 2,
                manual_url: Some(url),
            } => assert_eq!(url, &start_url),
            other => panic!("expected AcquisitionTimeout with URL, got {other:?}"),
        }
        assert!(
            err.to_string().contains(&manual_navigation_message(&start_url)),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn base_url_query_survives_into_polls() {
        let server = ScriptedAuthServer::start().await;
        server.script_polls([Reply::pending(), Reply::success("A")]);
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let browser = Arc::new(RecordingBrowser::new());

        let token = acquirer(browser.clone(), fast_config())
            .acquire(&server.base_url("svc?tenant=1"), "svc", &store)
            .await
            .unwrap();

        assert_eq!(token.expose(), "A");
        assert_eq!(server.polls(), 2);
        let start = Url::parse(&browser.opened()[0]).unwrap();
        assert_eq!(start.path(), "/svc/start");
        assert!(start.query_pairs().any(|(k, v)| k == "tenant" && v == "1"));
    }
}
