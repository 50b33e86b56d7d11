//! Cached / refresh / acquire decision
//!
//! The resolver owns no state of its own. The sink passed to each call is
//! the only place credentials live, which lets the same policy serve the
//! shared JSON store and per-call token files.
//!
//! A missing JSON store is read as "nothing cached": the first successful
//! write creates it. An unreadable store is a hard error.

use common::Secret;
use token_auth::{
    CredentialRecord, CredentialSink, Error, Result, TokenAcquirer, TokenRefresher, service_key,
};
use tracing::{debug, info, instrument, warn};

use crate::outcome::ToolOutcome;

/// Which branch produced the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPath {
    Cached,
    Refreshed,
    Acquired,
}

impl ResolutionPath {
    pub fn label(&self) -> &'static str {
        match self {
            ResolutionPath::Cached => "cached",
            ResolutionPath::Refreshed => "refresh",
            ResolutionPath::Acquired => "acquire",
        }
    }
}

/// A resolved token and how it was obtained.
#[derive(Debug)]
pub struct Resolution {
    pub key: String,
    pub path: ResolutionPath,
    pub token: Secret<String>,
}

/// Top-level token policy.
pub struct TokenResolver {
    acquirer: TokenAcquirer,
    refresher: TokenRefresher,
}

impl TokenResolver {
    pub fn new(acquirer: TokenAcquirer, refresher: TokenRefresher) -> Self {
        Self {
            acquirer,
            refresher,
        }
    }

    /// Resolve a token for the service at `base_url`.
    ///
    /// With `force` set, a cached token is replaced: by refresh when a refresh
    /// token is stored, otherwise by a full acquisition. A failed refresh is
    /// returned as-is; the caller decides whether to retry with acquisition.
    #[instrument(skip_all, fields(url = %base_url, force))]
    pub async fn resolve(
        &self,
        base_url: &str,
        force: bool,
        sink: &dyn CredentialSink,
    ) -> Result<Resolution> {
        let key = service_key(base_url)?;
        let cached = read_cached(sink, &key).await?.unwrap_or_default();

        let (path, token) = match (cached.access_token, force) {
            (None, _) => {
                debug!(key, "no cached token, starting acquisition");
                let token = self.acquirer.acquire(base_url, &key, sink).await?;
                (ResolutionPath::Acquired, token)
            }
            (Some(token), false) => {
                debug!(key, "returning cached token");
                (ResolutionPath::Cached, token)
            }
            (Some(_), true) => match cached.refresh_token {
                Some(refresh_token) => {
                    debug!(key, "forced regeneration, refreshing");
                    let token = self
                        .refresher
                        .refresh(base_url, &key, sink, &refresh_token)
                        .await?;
                    (ResolutionPath::Refreshed, token)
                }
                None => {
                    debug!(key, "forced regeneration without refresh token, acquiring");
                    let token = self.acquirer.acquire(base_url, &key, sink).await?;
                    (ResolutionPath::Acquired, token)
                }
            },
        };

        metrics::counter!("token_resolutions_total", "path" => path.label()).increment(1);
        info!(key, path = path.label(), "token resolved");
        Ok(Resolution { key, path, token })
    }

    /// `resolve()`, with every error folded into a structured outcome.
    pub async fn resolve_outcome(
        &self,
        base_url: &str,
        force: bool,
        sink: &dyn CredentialSink,
    ) -> ToolOutcome {
        match self.resolve(base_url, force, sink).await {
            Ok(resolution) => ToolOutcome::success(resolution.token),
            Err(e) => {
                warn!(url = %base_url, error = %e, "token resolution failed");
                ToolOutcome::error(e.to_string())
            }
        }
    }
}

async fn read_cached(
    sink: &dyn CredentialSink,
    key: &str,
) -> Result<Option<CredentialRecord>> {
    match sink.read(key).await {
        Err(Error::StoreMissing(path)) => {
            debug!(path = %path.display(), "credential store missing, nothing cached");
            Ok(None)
        }
        other => other,
    }
}
