//! Service key derivation and endpoint URLs
//!
//! A service is identified by its base URL. The credential store key is the
//! final path segment of that URL, and the three protocol endpoints hang off
//! it as sibling paths:
//!
//! - `{base}/start?request_id={id}`
//! - `{base}/get-token?request_id={id}`
//! - `{base}/refresh-token?refresh_token={token}`
//!
//! Endpoint paths are appended as path segments, so a query already on the
//! base URL is kept and the endpoint's own parameter is appended after it.
//! Correlation ids and refresh tokens are percent-encoded.

use reqwest::Url;

use crate::constants::{
    FETCH_TOKEN_PATH, REFRESH_TOKEN_PARAM, REFRESH_TOKEN_PATH, REQUEST_ID_PARAM, START_PATH,
};
use crate::error::{Error, Result};

/// Derive the credential store key from a service base URL.
///
/// `https://auth.example.com/svc-a` and `https://auth.example.com/svc-a/`
/// both map to `svc-a`. Distinct hosts or parent paths sharing a final
/// segment map to the same key: last write wins.
pub fn service_key(base_url: &str) -> Result<String> {
    let url = Url::parse(base_url)
        .map_err(|e| Error::InvalidServiceUrl(format!("{base_url}: {e}")))?;

    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::InvalidServiceUrl(format!(
                "{base_url} has no path segment to key the credential store"
            ))
        })
}

/// URL the browser opens to begin a flow for `request_id`.
pub fn start_url(base_url: &str, request_id: &str) -> Result<Url> {
    endpoint(base_url, START_PATH, REQUEST_ID_PARAM, request_id)
}

/// URL polled for the outcome of the flow for `request_id`.
pub fn fetch_url(base_url: &str, request_id: &str) -> Result<Url> {
    endpoint(base_url, FETCH_TOKEN_PATH, REQUEST_ID_PARAM, request_id)
}

/// URL exchanging `refresh_token` for a new token set.
///
/// The result embeds a secret; never log it.
pub fn refresh_url(base_url: &str, refresh_token: &str) -> Result<Url> {
    endpoint(base_url, REFRESH_TOKEN_PATH, REFRESH_TOKEN_PARAM, refresh_token)
}

fn endpoint(base_url: &str, path: &str, param: &str, value: &str) -> Result<Url> {
    let invalid = |reason: String| Error::InvalidServiceUrl(format!("{base_url}: {reason}"));
    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;

    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| invalid("cannot carry a path".into()))?
        .pop_if_empty()
        .push(path);
    url.query_pairs_mut().append_pair(param, value);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_final_path_segment() {
        assert_eq!(
            service_key("https://auth.example.com/svc-a").unwrap(),
            "svc-a"
        );
        assert_eq!(
            service_key("https://auth.example.com/tenants/42/svc-b").unwrap(),
            "svc-b"
        );
    }

    #[test]
    fn key_ignores_trailing_slash() {
        assert_eq!(
            service_key("https://auth.example.com/svc-a/").unwrap(),
            "svc-a"
        );
    }

    #[test]
    fn urls_sharing_final_segment_collide_on_key() {
        // Collision policy: last write wins, keyed by final path segment.
        let a = service_key("https://auth-one.example.com/svc").unwrap();
        let b = service_key("https://auth-two.example.org/team/svc").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn key_requires_a_path_segment() {
        let err = service_key("https://auth.example.com").unwrap_err();
        assert!(matches!(err, Error::InvalidServiceUrl(_)), "got: {err:?}");
        let err = service_key("https://auth.example.com/").unwrap_err();
        assert!(matches!(err, Error::InvalidServiceUrl(_)), "got: {err:?}");
    }

    #[test]
    fn key_rejects_unparseable_url() {
        let err = service_key("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidServiceUrl(_)), "got: {err:?}");
    }

    #[test]
    fn start_and_fetch_share_request_id() {
        let start = start_url("https://auth.example.com/svc-a", "abc-123").unwrap();
        let fetch = fetch_url("https://auth.example.com/svc-a/", "abc-123").unwrap();
        assert_eq!(
            start.as_str(),
            "https://auth.example.com/svc-a/start?request_id=abc-123"
        );
        assert_eq!(
            fetch.as_str(),
            "https://auth.example.com/svc-a/get-token?request_id=abc-123"
        );
    }

    #[test]
    fn refresh_token_is_percent_encoded() {
        let url = refresh_url("https://auth.example.com/svc-a", "rt/with+chars=").unwrap();
        assert_eq!(url.path(), "/svc-a/refresh-token");
        let (name, value) = url.query_pairs().next().unwrap();
        assert_eq!(name, "refresh_token");
        assert_eq!(value, "rt/with+chars=");
        assert!(!url.as_str().contains("rt/with+chars="));
    }

    #[test]
    fn base_query_is_kept_after_endpoint_path() {
        let base = "https://auth.example.com/svc?tenant=1";
        assert_eq!(service_key(base).unwrap(), "svc");

        let fetch = fetch_url(base, "id1").unwrap();
        assert_eq!(fetch.path(), "/svc/get-token");
        assert_eq!(
            fetch.as_str(),
            "https://auth.example.com/svc/get-token?tenant=1&request_id=id1"
        );

        let start = start_url("https://auth.example.com/svc/?tenant=1#top", "id1").unwrap();
        assert_eq!(start.path(), "/svc/start");
        assert_eq!(start.fragment(), None);
        let pairs: Vec<(String, String)> = start.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("tenant".to_string(), "1".to_string()),
                ("request_id".to_string(), "id1".to_string()),
            ]
        );
    }

    #[test]
    fn endpoint_rejects_url_without_path() {
        let err = fetch_url("mailto:ops@example.com", "id1").unwrap_err();
        assert!(matches!(err, Error::InvalidServiceUrl(_)), "got: {err:?}");
    }
}
