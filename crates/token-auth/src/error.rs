//! Error types for token acquisition, refresh and credential storage

use std::path::PathBuf;

use crate::browser::manual_navigation_message;

/// Errors from the credential store and the token flows.
///
/// `BrowserLaunchFailed` is downgraded to a warning by the acquirer and
/// `TransientNetwork` is retried inside the polling loop; every other kind
/// ends the operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential store not found at {}", .0.display())]
    StoreMissing(PathBuf),

    #[error("credential store unreadable: {0}")]
    StoreUnreadable(String),

    #[error("credential store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("could not open browser: {0}")]
    BrowserLaunchFailed(String),

    /// `manual_url` is set when the browser could not be opened, so the
    /// caller can still finish the flow by hand.
    #[error(
        "authorization was not completed after {attempts} polling attempts{}",
        manual_hint(.manual_url)
    )]
    AcquisitionTimeout {
        attempts: u32,
        manual_url: Option<String>,
    },

    #[error("authorization server error: {0}")]
    ExternalServer(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("invalid service URL: {0}")]
    InvalidServiceUrl(String),

    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),
}

fn manual_hint(manual_url: &Option<String>) -> String {
    match manual_url {
        Some(url) => format!(". {}", manual_navigation_message(url)),
        None => String::new(),
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_missing_names_the_path() {
        let err = Error::StoreMissing(PathBuf::from("/tmp/tb/credentials.json"));
        assert_eq!(
            err.to_string(),
            "credential store not found at /tmp/tb/credentials.json"
        );
    }

    #[test]
    fn timeout_reports_attempt_count() {
        let err = Error::AcquisitionTimeout {
            attempts: 6,
            manual_url: None,
        };
        assert_eq!(
            err.to_string(),
            "authorization was not completed after 6 polling attempts"
        );
    }

    #[test]
    fn timeout_carries_manual_navigation_url() {
        let url = "https://auth.example.com/svc/start?request_id=abc";
        let err = Error::AcquisitionTimeout {
            attempts: 6,
            manual_url: Some(url.into()),
        };
        let message = err.to_string();
        assert!(message.starts_with("authorization was not completed after 6"));
        assert!(message.contains(&manual_navigation_message(url)), "got: {message}");
    }

    #[test]
    fn external_server_keeps_message_verbatim() {
        let err = Error::ExternalServer("user denied access".into());
        assert_eq!(err.to_string(), "authorization server error: user denied access");
    }
}
