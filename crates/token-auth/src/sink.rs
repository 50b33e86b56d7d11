//! Persistence backends behind a single capability
//!
//! The acquirer and refresher only need to read a cached record and write a
//! fresh grant. Two backends implement that:
//!
//! - `CredentialStore`: the shared JSON document, all fields namespaced by key.
//! - `TokenFile`: a caller-chosen file holding just the bare access token.
//!   The key is ignored and there is no refresh token, so resolution through
//!   it is gated purely on the file existing.
//!
//! Methods return `Pin<Box<dyn Future>>` so sinks can be passed as
//! `&dyn CredentialSink`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{CredentialRecord, CredentialStore, write_atomic};
use crate::token::TokenGrant;

/// Boxed future returned by sink methods.
pub type SinkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Where resolved credentials are read from and written to.
pub trait CredentialSink: Send + Sync {
    /// Label for logs (a path, never a secret).
    fn describe(&self) -> String;

    /// Cached record for `key`, `None` if nothing was ever stored.
    fn read<'a>(&'a self, key: &'a str) -> SinkFuture<'a, Option<CredentialRecord>>;

    /// Persist a successful grant for `key`.
    fn write<'a>(&'a self, key: &'a str, grant: &'a TokenGrant) -> SinkFuture<'a, ()>;
}

impl CredentialSink for CredentialStore {
    fn describe(&self) -> String {
        format!("json store {}", self.path().display())
    }

    /// Propagates `StoreMissing`; the resolver decides how to treat it.
    fn read<'a>(&'a self, key: &'a str) -> SinkFuture<'a, Option<CredentialRecord>> {
        Box::pin(self.record(key))
    }

    fn write<'a>(&'a self, key: &'a str, grant: &'a TokenGrant) -> SinkFuture<'a, ()> {
        Box::pin(self.merge(key, grant.fields()))
    }
}

/// A file containing only an access token.
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_token(&self) -> Result<Option<CredentialRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::StoreUnreadable(format!(
                    "reading token file {}: {e}",
                    self.path.display()
                )));
            }
        };

        let token = contents.trim();
        if token.is_empty() {
            debug!(path = %self.path.display(), "token file is empty, treating as absent");
            return Ok(None);
        }

        Ok(Some(CredentialRecord {
            access_token: Some(Secret::new(token.to_owned())),
            ..CredentialRecord::default()
        }))
    }

    async fn write_token(&self, grant: &TokenGrant) -> Result<()> {
        let token = grant.access_token();
        write_atomic(&self.path, token.expose().as_bytes()).await
    }
}

impl CredentialSink for TokenFile {
    fn describe(&self) -> String {
        format!("token file {}", self.path.display())
    }

    fn read<'a>(&'a self, _key: &'a str) -> SinkFuture<'a, Option<CredentialRecord>> {
        Box::pin(self.read_token())
    }

    fn write<'a>(&'a self, _key: &'a str, grant: &'a TokenGrant) -> SinkFuture<'a, ()> {
        Box::pin(self.write_token(grant))
    }
}
