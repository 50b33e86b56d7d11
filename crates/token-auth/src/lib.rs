//! Token acquisition, refresh and credential storage
//!
//! Library half of the token broker. It knows how to talk to an external
//! authorization service and where to keep what it hands out; deciding
//! *when* to acquire or refresh lives in `token-resolver`.
//!
//! Credential flow:
//! 1. `endpoints::service_key()` derives the store key from a base URL
//! 2. `TokenAcquirer::acquire()` opens `{base}/start` in the browser and
//!    polls `{base}/get-token` until the flow succeeds, fails or times out
//! 3. `TokenRefresher::refresh()` trades a stored refresh token at
//!    `{base}/refresh-token`
//! 4. Both write the returned fields through a `CredentialSink`: the flat
//!    JSON `CredentialStore`, or a bare-token `TokenFile`

pub mod acquire;
pub mod browser;
pub mod constants;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod refresh;
pub mod sink;
pub mod store;
pub mod token;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use acquire::{PollConfig, TokenAcquirer};
pub use browser::{BrowserLauncher, NoBrowser, SystemBrowser, manual_navigation_message};
pub use endpoints::service_key;
pub use error::{Error, Result};
pub use http::build_client;
pub use refresh::TokenRefresher;
pub use sink::{CredentialSink, TokenFile};
pub use store::{CredentialRecord, CredentialStore, Document};
pub use token::{FlowStatus, TokenGrant, TokenResponse};
